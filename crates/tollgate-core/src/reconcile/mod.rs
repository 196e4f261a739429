//! Reconciliation
//!
//! After every primary call the snapshot delta of the call is compared with the
//! reports that explicitly claim usage (the primary report and any side-channel
//! reports buffered during the call). Whatever is left over per model becomes an
//! `Unaccounted` report, so that the reports of a turn always sum to what the
//! snapshot observed.

use crate::error::{Error, Result};
use crate::usage::{InteractionKind, ModelCounters, UsageMetrics, UsageReport, UsageSnapshot};
use tracing::debug;


/// Output of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Side-channel reports, enriched with the primary call's context
    pub side_reports: Vec<UsageReport>,
    /// Reports for usage no explicit report claims
    pub unaccounted: Vec<UsageReport>,
}

impl Reconciliation {
    /// All reports in ledger order: side reports first, then unaccounted
    #[must_use]
    pub fn into_reports(self) -> Vec<UsageReport> {
        let mut reports = self.side_reports;
        reports.extend(self.unaccounted);
        reports
    }
}

/// Whether a primary call on `primary_model` consumed the counters under `key`.
///
/// Hosts do not always record usage under the exact name the request used
/// (`gemini-2.5-pro` vs `models/gemini-2.5-pro-001`), so containment in either
/// direction counts as a match. Two distinct models where one name contains the
/// other (`gpt-4` and `gpt-4o`) are aliased by this rule. Empty names never match.
#[must_use]
pub fn model_matches(primary_model: &str, key: &str) -> bool {
    if primary_model.is_empty() || key.is_empty() {
        return false;
    }
    primary_model.contains(key) || key.contains(primary_model)
}

/// Fill missing context of each side report from the primary report
#[must_use]
pub fn enrich_side_reports(primary: &UsageReport, side_reports: &[UsageReport]) -> Vec<UsageReport> {
    side_reports.iter().map(|side| side.enriched_from(primary)).collect()
}

/// Reports for snapshot deltas between `pre` and `post` that neither `primary`
/// nor `side_reports` explain.
///
/// Input and output counts are apportioned by the unexplained share of the
/// total and truncated toward zero.
pub fn unaccounted_reports(
    pre: &UsageSnapshot,
    post: &UsageSnapshot,
    primary: &UsageReport,
    side_reports: &[UsageReport],
) -> Result<Vec<UsageReport>> {
    let mut reports = Vec::new();

    for (key, after) in post {
        let before = pre.get(key).copied().unwrap_or_default();
        let delta = Delta::between(&before, after);
        if delta.total <= 0 {
            continue;
        }

        let explained = explained_total(key, primary, side_reports)?;
        let remaining = delta.total - explained;
        if remaining <= 0 {
            continue;
        }

        let usage = UsageMetrics {
            input_tokens: apportion(delta.input, remaining, delta.total)?,
            output_tokens: apportion(delta.output, remaining, delta.total)?,
            reasoning_tokens: 0,
            cached_tokens: 0,
            total_tokens: to_count(remaining)?,
        };

        debug!(
            model = %key,
            delta_total = %delta.total,
            explained = %explained,
            remaining = %remaining,
            "Unaccounted usage attributed"
        );

        reports.push(UsageReport {
            usage,
            execution_time_ms: 0.0,
            model_identifier: key.clone(),
            interaction_kind: InteractionKind::Unaccounted,
            ..primary.clone()
        });
    }

    Ok(reports)
}

/// Run one reconciliation pass.
///
/// `side_reports` are the reports buffered during the primary call; they come
/// back enriched alongside the unaccounted reports.
pub fn reconcile(
    pre: &UsageSnapshot,
    post: &UsageSnapshot,
    primary: &UsageReport,
    side_reports: &[UsageReport],
) -> Result<Reconciliation> {
    let side_reports = enrich_side_reports(primary, side_reports);
    let unaccounted = unaccounted_reports(pre, post, primary, &side_reports)?;
    Ok(Reconciliation {
        side_reports,
        unaccounted,
    })
}

// ============================================================================
// Overlapping calls
// ============================================================================

/// Starting point of a finishing call's window.
///
/// Usage other calls claimed while this one was running already has a report,
/// so it is moved into the baseline: `pre + (claimed_now - pre_claimed)`.
#[must_use]
pub fn effective_baseline(
    pre: &UsageSnapshot,
    pre_claimed: &UsageSnapshot,
    claimed_now: &UsageSnapshot,
) -> UsageSnapshot {
    let mut baseline = pre.clone();
    for (key, now) in claimed_now {
        let before = pre_claimed.get(key).copied().unwrap_or_default();
        let since = ModelCounters {
            input: now.input.saturating_sub(before.input),
            output: now.output.saturating_sub(before.output),
            total: now.total.saturating_sub(before.total),
        };
        if since == ModelCounters::default() {
            continue;
        }
        let entry = baseline.entry(key.clone()).or_default();
        entry.input = entry.input.saturating_add(since.input);
        entry.output = entry.output.saturating_add(since.output);
        entry.total = entry.total.saturating_add(since.total);
    }
    baseline
}

/// Positive per-key growth from `baseline` to `post`: the usage a
/// reconciliation pass over that window accounts for.
#[must_use]
pub fn window_claims(baseline: &UsageSnapshot, post: &UsageSnapshot) -> UsageSnapshot {
    post.iter()
        .filter_map(|(key, after)| {
            let before = baseline.get(key).copied().unwrap_or_default();
            let claim = ModelCounters {
                input: after.input.saturating_sub(before.input),
                output: after.output.saturating_sub(before.output),
                total: after.total.saturating_sub(before.total),
            };
            (claim.total > 0).then(|| (key.clone(), claim))
        })
        .collect()
}

/// Everything one pass accounts for: its window growth, raised per key to
/// the side reports it consumed.
///
/// A side report recorded before this call started (an outer call's side
/// channel) is explained here but lies outside the window; claiming it keeps
/// the outer call from reporting the same tokens as unaccounted.
#[must_use]
pub fn pass_claims(window: UsageSnapshot, side_reports: &[UsageReport]) -> UsageSnapshot {
    let mut side = UsageSnapshot::new();
    for report in side_reports {
        let entry = side.entry(report.model_identifier.clone()).or_default();
        entry.input = entry.input.saturating_add(report.usage.input_tokens);
        entry.output = entry.output.saturating_add(report.usage.output_tokens);
        entry.total = entry.total.saturating_add(report.usage.total_tokens);
    }

    let mut claims = window;
    for (key, explained) in side {
        let entry = claims.entry(key).or_default();
        entry.input = entry.input.max(explained.input);
        entry.output = entry.output.max(explained.output);
        entry.total = entry.total.max(explained.total);
    }
    claims.retain(|_, c| c.total > 0);
    claims
}

// ============================================================================
// Arithmetic
// ============================================================================

/// Signed per-model delta. Counters only grow, but a host that resets a
/// counter mid-turn produces negative deltas, which are skipped or clamped.
#[derive(Debug, Clone, Copy)]
struct Delta {
    input: i128,
    output: i128,
    total: i128,
}

impl Delta {
    fn between(before: &ModelCounters, after: &ModelCounters) -> Self {
        Self {
            input: i128::from(after.input) - i128::from(before.input),
            output: i128::from(after.output) - i128::from(before.output),
            total: i128::from(after.total) - i128::from(before.total),
        }
    }
}

fn explained_total(key: &str, primary: &UsageReport, side_reports: &[UsageReport]) -> Result<i128> {
    let mut explained: i128 = 0;

    if primary.total_tokens() > 0 && model_matches(&primary.model_identifier, key) {
        explained = i128::from(primary.total_tokens());
    }

    for side in side_reports.iter().filter(|s| s.model_identifier == key) {
        explained = explained
            .checked_add(i128::from(side.total_tokens()))
            .ok_or_else(|| Error::Reconciliation(format!("explained usage overflow for {key}")))?;
    }

    Ok(explained)
}

fn apportion(part: i128, remaining: i128, total: i128) -> Result<u64> {
    let scaled = part
        .max(0)
        .checked_mul(remaining)
        .ok_or_else(|| Error::Reconciliation("apportioned usage overflow".to_string()))?;
    to_count(scaled / total)
}

fn to_count(value: i128) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::Reconciliation(format!("token count out of range: {value}")))
}
