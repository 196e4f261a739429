//! Performance report
//!
//! Markdown summary of one turn's usage reports: totals, a per-model table and
//! a breakdown by interaction kind.

use crate::context::TurnIdentity;
use crate::error::Result;
use crate::usage::{InteractionKind, UsageReport};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Default)]
struct ModelRow {
    calls: usize,
    input: u64,
    output: u64,
    reasoning: u64,
    total: u64,
    time_ms: f64,
}

#[derive(Default)]
struct KindRow {
    reports: usize,
    total: u64,
}

/// Render the turn's reports as Markdown
#[must_use]
pub fn render_markdown(reports: &[UsageReport], identity: &TurnIdentity) -> String {
    let mut by_model: BTreeMap<&str, ModelRow> = BTreeMap::new();
    let mut by_kind: BTreeMap<InteractionKind, KindRow> = BTreeMap::new();

    for report in reports {
        let row = by_model.entry(report.model_identifier.as_str()).or_default();
        row.calls += 1;
        row.input = row.input.saturating_add(report.usage.input_tokens);
        row.output = row.output.saturating_add(report.usage.output_tokens);
        row.reasoning = row.reasoning.saturating_add(report.usage.reasoning_tokens);
        row.total = row.total.saturating_add(report.usage.total_tokens);
        row.time_ms += report.execution_time_ms;

        let kind = by_kind.entry(report.interaction_kind).or_default();
        kind.reports += 1;
        kind.total = kind.total.saturating_add(report.usage.total_tokens);
    }

    let total_tokens: u64 = by_model.values().map(|r| r.total).sum();
    let total_time_ms: f64 = by_model.values().map(|r| r.time_ms).sum();

    let mut md = String::from("# Performance Report\n\n");
    md.push_str(&format!(
        "- **Session**: {}\n",
        identity.session_id.as_deref().unwrap_or("-")
    ));
    md.push_str(&format!(
        "- **Invocation**: {}\n",
        identity.invocation_id.as_deref().unwrap_or("-")
    ));
    md.push_str(&format!("- **Reports**: {}\n", reports.len()));
    md.push_str(&format!("- **Total tokens**: {}\n", total_tokens));
    md.push_str(&format!("- **Model time**: {:.1} ms\n\n", total_time_ms));

    md.push_str("## By model\n\n");
    md.push_str("| Model | Calls | Input | Output | Reasoning | Total | Avg latency (ms) |\n");
    md.push_str("|---|---:|---:|---:|---:|---:|---:|\n");
    for (model, row) in &by_model {
        let avg = row.time_ms / row.calls as f64;
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {:.1} |\n",
            model, row.calls, row.input, row.output, row.reasoning, row.total, avg
        ));
    }

    md.push_str("\n## By interaction kind\n\n");
    md.push_str("| Kind | Reports | Total tokens | Share |\n");
    md.push_str("|---|---:|---:|---:|\n");
    for (kind, row) in &by_kind {
        let share = if total_tokens == 0 {
            0.0
        } else {
            row.total as f64 * 100.0 / total_tokens as f64
        };
        md.push_str(&format!(
            "| {} | {} | {} | {:.1}% |\n",
            kind, row.reports, row.total, share
        ));
    }

    md
}

/// File name for a report: `performance_<session8>_<YYYYmmdd_HHMMSS>.md`
#[must_use]
pub fn report_filename(session_id: &str) -> String {
    let prefix: String = session_id.chars().take(8).collect();
    format!("performance_{}_{}.md", prefix, Utc::now().format("%Y%m%d_%H%M%S"))
}

/// Write a report under `dir`, creating it if needed
pub async fn save_report(dir: &Path, session_id: &str, markdown: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_filename(session_id));
    tokio::fs::write(&path, markdown).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::UsageMetrics;
    use tempfile::TempDir;

    fn report(model: &str, total: u64, kind: InteractionKind, time_ms: f64) -> UsageReport {
        let mut report = UsageReport::new(model, UsageMetrics::new(total, 0, 0, 0, total), kind);
        report.execution_time_ms = time_ms;
        report
    }

    #[test]
    fn test_render_groups_by_model_and_kind() {
        let reports = vec![
            report("main", 40, InteractionKind::Primary, 100.0),
            report("translator", 10, InteractionKind::SideChannel, 20.0),
            report("main", 30, InteractionKind::Primary, 300.0),
            report("main", 20, InteractionKind::Unaccounted, 0.0),
        ];
        let identity = TurnIdentity::new("user", "session-1", "inv-1");

        let md = render_markdown(&reports, &identity);

        assert!(md.starts_with("# Performance Report"));
        assert!(md.contains("- **Session**: session-1"));
        assert!(md.contains("- **Total tokens**: 100"));
        assert!(md.contains("| main | 3 | 90 | 0 | 0 | 90 | 133.3 |"));
        assert!(md.contains("| translator | 1 | 10 | 0 | 0 | 10 | 20.0 |"));
        assert!(md.contains("| primary | 2 | 70 | 70.0% |"));
        assert!(md.contains("| unaccounted | 1 | 20 | 20.0% |"));

        let main_pos = md.find("| main |").unwrap();
        let translator_pos = md.find("| translator |").unwrap();
        assert!(main_pos < translator_pos);
    }

    #[test]
    fn test_render_empty_turn() {
        let md = render_markdown(&[], &TurnIdentity::default());
        assert!(md.contains("- **Reports**: 0"));
        assert!(md.contains("- **Session**: -"));
    }

    #[test]
    fn test_filename_truncates_session() {
        let name = report_filename("abcdefghijkl");
        assert!(name.starts_with("performance_abcdefgh_"));
        assert!(name.ends_with(".md"));
        // performance_ + 8 + _ + 15 + .md
        assert_eq!(name.len(), 12 + 8 + 1 + 15 + 3);
    }

    #[tokio::test]
    async fn test_save_report_creates_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("reports").join("nested");

        let path = save_report(&target, "session-1", "# Performance Report\n").await.unwrap();

        assert!(path.starts_with(&target));
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content, "# Performance Report\n");
    }
}
