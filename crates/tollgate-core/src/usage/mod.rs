//! Usage - token metrics, reports and the per-turn snapshot
//!
//! # Module Structure
//!
//! - `metrics`: canonical usage tuple and extraction from model responses
//! - `report`: the immutable usage record persisted per model call
//! - `snapshot`: cumulative per-model counters shared by every call site in a turn
//! - `builder`: per-call context and report construction

mod builder;
mod metrics;
mod report;
mod snapshot;


pub use builder::{CallContext, ReportBuilder};
pub use metrics::{extract_metrics, UsageMetrics};
pub use report::{InteractionKind, UsageReport, NOT_AVAILABLE, UNKNOWN_MODEL};
pub use snapshot::{ModelCounters, UsageSnapshot, UsageSnapshotStore};
