//! Usage Snapshot
//!
//! Cumulative per-model counters for one turn. Every model call site adds to it,
//! the reconciliation pass only reads copies.

use super::metrics::UsageMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// Cumulative counters for one model key
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCounters {
    /// Input tokens
    pub input: u64,
    /// Output tokens
    pub output: u64,
    /// Total tokens
    pub total: u64,
}

/// Point-in-time copy of all counters, keyed by model identifier
pub type UsageSnapshot = BTreeMap<String, ModelCounters>;

/// Turn-scoped snapshot store.
///
/// Updates are serialized through a mutex so concurrent call sites never lose
/// an increment.
#[derive(Debug, Default)]
pub struct UsageSnapshotStore {
    counters: Mutex<UsageSnapshot>,
}

impl UsageSnapshotStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add usage for `model`
    pub async fn record(&self, model: &str, input: u64, output: u64, total: u64) {
        let mut counters = self.counters.lock().await;
        let entry = counters.entry(model.to_string()).or_default();
        entry.input = entry.input.saturating_add(input);
        entry.output = entry.output.saturating_add(output);
        entry.total = entry.total.saturating_add(total);
    }

    /// Add extracted metrics for `model`
    pub async fn record_metrics(&self, model: &str, usage: &UsageMetrics) {
        self.record(model, usage.input_tokens, usage.output_tokens, usage.total_tokens)
            .await;
    }

    /// Copy of the current counters
    pub async fn snapshot(&self) -> UsageSnapshot {
        self.counters.lock().await.clone()
    }

    /// Counters for one model
    pub async fn get(&self, model: &str) -> Option<ModelCounters> {
        self.counters.lock().await.get(model).copied()
    }
}
