//! Usage Report
//!
//! The record persisted for every model call (and every synthetic attribution).

use super::metrics::UsageMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder for prompt/response text that was not captured
pub const NOT_AVAILABLE: &str = "N/A";

/// Placeholder model identifier when the request named none
pub const UNKNOWN_MODEL: &str = "unknown_model";

/// Where a report's usage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// The agent's own model call
    Primary,
    /// An auxiliary call made while handling a primary call
    SideChannel,
    /// Snapshot delta no explicit report accounted for
    Unaccounted,
}

impl InteractionKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::SideChannel => "side_channel",
            Self::Unaccounted => "unaccounted",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(Self::Primary),
            "side_channel" => Ok(Self::SideChannel),
            "unaccounted" => Ok(Self::Unaccounted),
            other => Err(format!("unknown interaction kind: {other}")),
        }
    }
}

/// One usage record.
///
/// Built once and never mutated afterwards; enrichment produces a new value.
/// Serializes flat (usage counters inline) so it maps 1:1 onto a table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageReport {
    /// End user
    pub user_id: Option<String>,
    /// Conversation session
    pub session_id: Option<String>,
    /// Agent invocation (turn)
    pub invocation_id: Option<String>,
    /// Agent application name
    pub app_name: Option<String>,
    /// Agent base URL
    pub base_url: Option<String>,
    /// Prompt text, `"N/A"` when not captured
    pub user_prompt: String,
    /// Response text, `"N/A"` when not captured
    pub response_text: String,
    /// Token counts
    #[serde(flatten)]
    pub usage: UsageMetrics,
    /// Wall-clock time of the call
    pub execution_time_ms: f64,
    /// Model that consumed the tokens
    pub model_identifier: String,
    /// Creation time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Origin of the usage
    pub interaction_kind: InteractionKind,
}

impl UsageReport {
    /// Report with no context and placeholder text
    #[must_use]
    pub fn new(
        model_identifier: impl Into<String>,
        usage: UsageMetrics,
        interaction_kind: InteractionKind,
    ) -> Self {
        Self {
            user_id: None,
            session_id: None,
            invocation_id: None,
            app_name: None,
            base_url: None,
            user_prompt: NOT_AVAILABLE.to_string(),
            response_text: NOT_AVAILABLE.to_string(),
            usage,
            execution_time_ms: 0.0,
            model_identifier: model_identifier.into(),
            timestamp: Utc::now(),
            interaction_kind,
        }
    }

    /// Total tokens of this report
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.usage.total_tokens
    }

    /// Copy of this report with missing context taken from `base`.
    ///
    /// Fields this report already carries are kept; placeholder prompt/response
    /// text counts as missing.
    #[must_use]
    pub fn enriched_from(&self, base: &UsageReport) -> UsageReport {
        fn fill(own: &Option<String>, base: &Option<String>) -> Option<String> {
            match own {
                Some(v) if !v.is_empty() => Some(v.clone()),
                _ => base.clone(),
            }
        }
        fn fill_text(own: &str, base: &str) -> String {
            if own == NOT_AVAILABLE {
                base.to_string()
            } else {
                own.to_string()
            }
        }

        UsageReport {
            user_id: fill(&self.user_id, &base.user_id),
            session_id: fill(&self.session_id, &base.session_id),
            invocation_id: fill(&self.invocation_id, &base.invocation_id),
            app_name: fill(&self.app_name, &base.app_name),
            base_url: fill(&self.base_url, &base.base_url),
            user_prompt: fill_text(&self.user_prompt, &base.user_prompt),
            response_text: fill_text(&self.response_text, &base.response_text),
            ..self.clone()
        }
    }
}
