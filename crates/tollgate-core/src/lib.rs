//! Tollgate Core - Usage accounting for agent turns
//!
//! This crate observes every model call inside an agent turn and turns the
//! observed token usage into persisted records:
//! - Usage: snapshot store, metric extraction, report construction
//! - Reconcile: attributes snapshot deltas nobody reported explicitly
//! - Ledger: per-turn report buffer and per-call markers
//! - Persistence: provider strategies (BigQuery, SQLite) behind a lazy service
//! - Hooks: the before/after model, side-channel and after-turn callbacks
//! - Translate: thought translation through an auxiliary model (a side channel)
//! - Performance: Markdown summary of a turn's reports

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod ledger;
pub mod performance;
pub mod persistence;
pub mod reconcile;
pub mod translate;
pub mod usage;

pub use config::{
    AgentConfig, BigQueryConfig, PerformanceReportConfig, PersistenceConfig, TollgateConfig,
    TranslationConfig,
};
pub use context::{TurnContext, TurnIdentity, LAST_PERFORMANCE_REPORT};
pub use error::{Error, Result};
pub use hooks::{FlushHandle, HookOutcome, ModelCallbacks, SideChannelCall, UsageHooks};
pub use ledger::{CallMarkers, TurnLedger};
pub use performance::render_markdown;
pub use persistence::{
    BatchOutcome, BigQueryProvider, LazyPersistence, PersistenceFactory, PersistenceProvider,
    PersistenceService, ProviderKind, RowError, SqliteProvider,
};
pub use reconcile::{
    effective_baseline, enrich_side_reports, model_matches, pass_claims, reconcile,
    unaccounted_reports, window_claims, Reconciliation,
};
pub use translate::ThoughtTranslator;
pub use usage::{
    extract_metrics, CallContext, InteractionKind, ModelCounters, ReportBuilder, UsageMetrics,
    UsageReport, UsageSnapshot, UsageSnapshotStore,
};
