//! Usage Metrics
//!
//! Normalizes provider usage metadata into one canonical tuple.

use serde::{Deserialize, Serialize};
use tollgate_llm::ModelResponse;

/// Canonical token counts for one model call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Prompt tokens
    pub input_tokens: u64,
    /// Generated tokens
    pub output_tokens: u64,
    /// Reasoning tokens
    pub reasoning_tokens: u64,
    /// Tokens served from cache
    pub cached_tokens: u64,
    /// Total billed tokens
    pub total_tokens: u64,
}

impl UsageMetrics {
    /// Build metrics and apply the reasoning backfill
    #[must_use]
    pub fn new(
        input_tokens: u64,
        output_tokens: u64,
        reasoning_tokens: u64,
        cached_tokens: u64,
        total_tokens: u64,
    ) -> Self {
        Self {
            input_tokens,
            output_tokens,
            reasoning_tokens,
            cached_tokens,
            total_tokens,
        }
        .backfilled()
    }

    /// Fill in reasoning tokens the provider consumed but did not report.
    ///
    /// When `reasoning_tokens` is zero and the total exceeds input + output, the
    /// difference is reasoning.
    #[must_use]
    pub fn backfilled(mut self) -> Self {
        let explained = self.input_tokens.saturating_add(self.output_tokens);
        if self.reasoning_tokens == 0 && self.total_tokens > explained {
            self.reasoning_tokens = self.total_tokens - explained;
        }
        self
    }

    /// True when every counter is zero
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract usage from a model response.
///
/// Never fails: a response without usage metadata yields all zeros, and missing
/// sub-counts are treated as zero.
#[must_use]
pub fn extract_metrics(response: &ModelResponse) -> UsageMetrics {
    let Some(meta) = &response.usage_metadata else {
        return UsageMetrics::default();
    };

    UsageMetrics::new(
        meta.prompt_token_count.unwrap_or(0),
        meta.candidates_token_count.unwrap_or(0),
        meta.thoughts_token_count.unwrap_or(0),
        meta.cached_content_token_count.unwrap_or(0),
        meta.total_token_count.unwrap_or(0),
    )
}
