//! Turn Ledger
//!
//! Ordered buffer of the reports produced during one turn, plus the transient
//! per-call markers the before-model hook leaves for the after-model hook.
//!
//! The ledger also tracks, per snapshot key, how much usage reconciliation has
//! already claimed. Calls that overlap use it to avoid claiming the same tokens
//! twice.
//!
//! Reports are only ever appended until the turn ends; `drain` takes the whole
//! buffer at once so a flush never sees a partial turn.

use crate::reconcile::{effective_baseline, pass_claims, window_claims};
use crate::usage::{UsageReport, UsageSnapshot};
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::Mutex;
use tollgate_llm::CallId;

/// Values captured by the before-model hook for one call
#[derive(Debug, Clone)]
pub struct CallMarkers {
    /// When the before-model hook ran
    pub started_at: Instant,
    /// Snapshot copy taken before the call
    pub pre_usage: UsageSnapshot,
    /// Claimed usage when the call started
    pub pre_claimed: UsageSnapshot,
    /// Model named by the request
    pub model_identifier: String,
    /// Prompt text of the request
    pub user_prompt: String,
}

/// Per-turn report buffer
#[derive(Debug, Default)]
pub struct TurnLedger {
    reports: Mutex<Vec<UsageReport>>,
    pending_side: Mutex<Vec<UsageReport>>,
    markers: Mutex<HashMap<CallId, CallMarkers>>,
    claimed: Mutex<UsageSnapshot>,
}

impl TurnLedger {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one report
    pub async fn append(&self, report: UsageReport) {
        self.reports.lock().await.push(report);
    }

    /// Append several reports, keeping their order
    pub async fn append_all(&self, reports: impl IntoIterator<Item = UsageReport>) {
        self.reports.lock().await.extend(reports);
    }

    /// Take every buffered report, leaving the ledger empty
    pub async fn drain(&self) -> Vec<UsageReport> {
        std::mem::take(&mut *self.reports.lock().await)
    }

    /// Number of buffered reports
    pub async fn len(&self) -> usize {
        self.reports.lock().await.len()
    }

    /// True when no report is buffered
    pub async fn is_empty(&self) -> bool {
        self.reports.lock().await.is_empty()
    }

    // ========================================================================
    // Side reports
    // ========================================================================

    /// Queue a side-channel report until the next reconciliation pass
    pub async fn enqueue_side_report(&self, report: UsageReport) {
        self.pending_side.lock().await.push(report);
    }

    /// Take every queued side-channel report
    pub async fn take_side_reports(&self) -> Vec<UsageReport> {
        std::mem::take(&mut *self.pending_side.lock().await)
    }

    // ========================================================================
    // Call markers
    // ========================================================================

    /// Store the markers of one call, replacing any previous ones
    pub async fn set_markers(&self, call_id: CallId, markers: CallMarkers) {
        self.markers.lock().await.insert(call_id, markers);
    }

    /// Markers of one call
    pub async fn markers(&self, call_id: CallId) -> Option<CallMarkers> {
        self.markers.lock().await.get(&call_id).cloned()
    }

    /// Drop the markers of one call, returning them
    pub async fn snapshot_clear_markers(&self, call_id: CallId) -> Option<CallMarkers> {
        self.markers.lock().await.remove(&call_id)
    }

    // ========================================================================
    // Claimed usage
    // ========================================================================

    /// Copy of the usage claimed so far, per snapshot key
    pub async fn claimed(&self) -> UsageSnapshot {
        self.claimed.lock().await.clone()
    }

    /// Baseline for a call finishing at `post`.
    ///
    /// The call's window and the side reports it consumed are claimed in the
    /// same step, so no two passes account for the same usage.
    pub async fn claim_window(
        &self,
        markers: &CallMarkers,
        post: &UsageSnapshot,
        side_reports: &[UsageReport],
    ) -> UsageSnapshot {
        let mut claimed = self.claimed.lock().await;
        let baseline = effective_baseline(&markers.pre_usage, &markers.pre_claimed, &claimed);
        let claims = pass_claims(window_claims(&baseline, post), side_reports);
        for (key, claim) in claims {
            let entry = claimed.entry(key).or_default();
            entry.input = entry.input.saturating_add(claim.input);
            entry.output = entry.output.saturating_add(claim.output);
            entry.total = entry.total.saturating_add(claim.total);
        }
        baseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{InteractionKind, ModelCounters, UsageMetrics};

    fn report(model: &str) -> UsageReport {
        UsageReport::new(model, UsageMetrics::default(), InteractionKind::Primary)
    }

    fn markers(model: &str) -> CallMarkers {
        CallMarkers {
            started_at: Instant::now(),
            pre_usage: UsageSnapshot::new(),
            pre_claimed: UsageSnapshot::new(),
            model_identifier: model.to_string(),
            user_prompt: "prompt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_drain_keeps_order_and_empties() {
        let ledger = TurnLedger::new();
        ledger.append(report("a")).await;
        ledger.append_all(vec![report("b"), report("c")]).await;
        assert_eq!(ledger.len().await, 3);

        let drained = ledger.drain().await;
        let models: Vec<_> = drained.iter().map(|r| r.model_identifier.as_str()).collect();

        assert_eq!(models, vec!["a", "b", "c"]);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_empty_is_idempotent() {
        let ledger = TurnLedger::new();
        assert!(ledger.drain().await.is_empty());
        assert!(ledger.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_side_queue_taken_once() {
        let ledger = TurnLedger::new();
        ledger.enqueue_side_report(report("side")).await;

        assert_eq!(ledger.take_side_reports().await.len(), 1);
        assert!(ledger.take_side_reports().await.is_empty());
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_claimed_window_is_not_claimed_twice() {
        let ledger = TurnLedger::new();
        let post: UsageSnapshot = [(
            "model-a".to_string(),
            ModelCounters {
                input: 1,
                output: 2,
                total: 3,
            },
        )]
        .into_iter()
        .collect();
        let outer = markers("model-a");
        let inner = markers("model-a");

        let inner_baseline = ledger.claim_window(&inner, &post, &[]).await;
        let outer_baseline = ledger.claim_window(&outer, &post, &[]).await;

        assert!(inner_baseline.is_empty());
        assert_eq!(outer_baseline.get("model-a").map(|c| c.total), Some(3));
        assert_eq!(ledger.claimed().await.get("model-a").map(|c| c.total), Some(3));
    }

    #[tokio::test]
    async fn test_markers_are_per_call() {
        let ledger = TurnLedger::new();
        let first = CallId::new();
        let second = CallId::new();
        ledger.set_markers(first, markers("model-a")).await;
        ledger.set_markers(second, markers("model-b")).await;

        let cleared = ledger.snapshot_clear_markers(first).await;

        assert_eq!(cleared.map(|m| m.model_identifier), Some("model-a".to_string()));
        assert!(ledger.markers(first).await.is_none());
        assert_eq!(
            ledger.markers(second).await.map(|m| m.model_identifier),
            Some("model-b".to_string())
        );
    }
}
