//! Report Builder
//!
//! Captures the per-call context once and turns metrics into reports.

use super::metrics::UsageMetrics;
use super::report::{InteractionKind, UsageReport, NOT_AVAILABLE, UNKNOWN_MODEL};
use crate::config::AgentConfig;
use crate::context::TurnIdentity;
use crate::ledger::CallMarkers;
use chrono::{DateTime, Utc};

/// Context shared by every report produced for one model call
#[derive(Debug, Clone, PartialEq)]
pub struct CallContext {
    /// End user
    pub user_id: Option<String>,
    /// Conversation session
    pub session_id: Option<String>,
    /// Agent invocation
    pub invocation_id: Option<String>,
    /// Agent application name
    pub app_name: Option<String>,
    /// Agent base URL
    pub base_url: Option<String>,
    /// Model named by the request
    pub model_identifier: String,
    /// Prompt captured before the call
    pub user_prompt: String,
    /// Time between this call's before and after hooks
    pub execution_time_ms: f64,
    /// When the context was captured
    pub timestamp: DateTime<Utc>,
}

/// Builds reports stamped with the agent's identity
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    app_name: String,
    base_url: String,
}

impl ReportBuilder {
    /// Create a builder for the given agent
    #[must_use]
    pub fn new(agent: &AgentConfig) -> Self {
        Self {
            app_name: agent.app_name.clone(),
            base_url: agent.base_url.clone(),
        }
    }

    /// Capture the context of one call.
    ///
    /// `markers` are the values the before-model hook stored for this call id;
    /// without them the model is unknown and the execution time is zero.
    #[must_use]
    pub fn call_context(&self, identity: &TurnIdentity, markers: Option<&CallMarkers>) -> CallContext {
        let (model_identifier, user_prompt, execution_time_ms) = match markers {
            Some(m) => (
                m.model_identifier.clone(),
                m.user_prompt.clone(),
                m.started_at.elapsed().as_secs_f64() * 1000.0,
            ),
            None => (UNKNOWN_MODEL.to_string(), NOT_AVAILABLE.to_string(), 0.0),
        };

        CallContext {
            user_id: identity.user_id.clone(),
            session_id: identity.session_id.clone(),
            invocation_id: identity.invocation_id.clone(),
            app_name: Some(self.app_name.clone()),
            base_url: Some(self.base_url.clone()),
            model_identifier,
            user_prompt,
            execution_time_ms,
            timestamp: Utc::now(),
        }
    }

    /// Build a report for the call described by `ctx`
    #[must_use]
    pub fn build(
        ctx: &CallContext,
        usage: UsageMetrics,
        response_text: Option<String>,
        interaction_kind: InteractionKind,
    ) -> UsageReport {
        UsageReport {
            user_id: ctx.user_id.clone(),
            session_id: ctx.session_id.clone(),
            invocation_id: ctx.invocation_id.clone(),
            app_name: ctx.app_name.clone(),
            base_url: ctx.base_url.clone(),
            user_prompt: ctx.user_prompt.clone(),
            response_text: response_text.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            usage,
            execution_time_ms: ctx.execution_time_ms,
            model_identifier: ctx.model_identifier.clone(),
            timestamp: ctx.timestamp,
            interaction_kind,
        }
    }

    /// Build a side-channel report.
    ///
    /// Identity fields stay empty; they are filled from the primary report when
    /// the report is reconciled.
    #[must_use]
    pub fn side_channel(
        model: &str,
        prompt: Option<String>,
        response_text: Option<String>,
        usage: UsageMetrics,
        execution_time_ms: f64,
    ) -> UsageReport {
        UsageReport {
            user_prompt: prompt.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            response_text: response_text.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            execution_time_ms: execution_time_ms.max(0.0),
            ..UsageReport::new(model, usage, InteractionKind::SideChannel)
        }
    }
}
