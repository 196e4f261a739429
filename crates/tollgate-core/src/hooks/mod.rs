//! Lifecycle Hooks
//!
//! The callbacks the agent host drives around every model call:
//! - `before_model`: marks the call start and snapshots the usage counters
//! - `after_model`: reports the call and reconciles it against the snapshot
//! - `on_side_channel`: records an auxiliary model call made during the turn
//! - `after_turn`: hands the turn's reports to persistence in one batch
//!
//! Hooks never fail and never change what the host does: internal errors and
//! panics are logged and every hook answers [`HookOutcome::Continue`].

use crate::config::{PerformanceReportConfig, TollgateConfig};
use crate::context::{TurnContext, LAST_PERFORMANCE_REPORT};
use crate::ledger::CallMarkers;
use crate::performance;
use crate::persistence::{BatchOutcome, LazyPersistence};
use crate::reconcile::{enrich_side_reports, unaccounted_reports};
use crate::usage::{
    extract_metrics, InteractionKind, ReportBuilder, UsageMetrics, NOT_AVAILABLE, UNKNOWN_MODEL,
};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tollgate_llm::{ModelRequest, ModelResponse};
use tracing::{debug, error, info, warn};


/// What the host should do after a hook ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Proceed unchanged
    Continue,
}

/// An auxiliary model call made while servicing the turn
#[derive(Debug, Clone, PartialEq)]
pub struct SideChannelCall {
    /// Model the auxiliary call ran on
    pub model: String,
    /// Prompt sent, if captured
    pub prompt: Option<String>,
    /// Text received, if captured
    pub response_text: Option<String>,
    /// Usage of the call
    pub usage: UsageMetrics,
    /// Wall-clock time of the call
    pub execution_time_ms: f64,
}

impl SideChannelCall {
    /// Describe a finished auxiliary call from its response
    #[must_use]
    pub fn from_response(
        model: impl Into<String>,
        prompt: impl Into<String>,
        response: &ModelResponse,
        elapsed: Duration,
    ) -> Self {
        Self {
            model: model.into(),
            prompt: Some(prompt.into()),
            response_text: response.text(),
            usage: extract_metrics(response),
            execution_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Handle to the background flush started by `after_turn`.
///
/// Dropping it leaves the flush running.
#[derive(Debug)]
pub struct FlushHandle(Option<JoinHandle<Option<BatchOutcome>>>);

impl FlushHandle {
    /// Handle for a turn that had nothing to flush
    #[must_use]
    pub fn noop() -> Self {
        Self(None)
    }

    /// True when no flush was started
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.0.is_none()
    }

    /// Wait for the flush to finish.
    ///
    /// `None` when nothing was flushed, persistence is not configured, the
    /// write timed out, or the task failed.
    pub async fn wait(self) -> Option<BatchOutcome> {
        let handle = self.0?;
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "Usage flush task failed");
                None
            }
        }
    }
}

/// Model call callbacks driven by the agent host
#[async_trait]
pub trait ModelCallbacks: Send + Sync {
    /// Before a model call
    async fn before_model(&self, ctx: &TurnContext, request: &ModelRequest) -> HookOutcome;

    /// After a model call returned (or was cancelled)
    async fn after_model(&self, ctx: &TurnContext, response: &ModelResponse) -> HookOutcome;

    /// After an auxiliary model call
    async fn on_side_channel(&self, ctx: &TurnContext, call: SideChannelCall) -> HookOutcome;

    /// At the end of the turn
    async fn after_turn(&self, ctx: &TurnContext) -> FlushHandle;
}

/// Usage accounting callbacks
pub struct UsageHooks {
    builder: ReportBuilder,
    persistence: Arc<LazyPersistence>,
    performance: PerformanceReportConfig,
    persist_timeout: Duration,
}

impl UsageHooks {
    /// Create hooks that flush through `persistence`
    #[must_use]
    pub fn new(config: &TollgateConfig, persistence: Arc<LazyPersistence>) -> Self {
        Self {
            builder: ReportBuilder::new(&config.agent),
            persistence,
            performance: config.performance.clone(),
            persist_timeout: config.persistence.persist_timeout(),
        }
    }

    /// Create hooks whose persistence is built from the configuration on first flush
    #[must_use]
    pub fn from_config(config: &TollgateConfig) -> Self {
        let persistence = Arc::new(LazyPersistence::from_config(config.persistence.clone()));
        Self::new(config, persistence)
    }

    /// Override the turn-end persistence bound; zero keeps the current one
    #[must_use]
    pub fn with_persist_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.persist_timeout = timeout;
        }
        self
    }

    async fn record_call_start(&self, ctx: &TurnContext, request: &ModelRequest) {
        let markers = CallMarkers {
            started_at: Instant::now(),
            pre_usage: ctx.snapshot().snapshot().await,
            pre_claimed: ctx.ledger().claimed().await,
            model_identifier: request
                .model
                .clone()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            user_prompt: request
                .last_text()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        };

        debug!(call_id = %request.call_id, model = %markers.model_identifier, "Model call started");
        ctx.ledger().set_markers(request.call_id, markers).await;
    }

    async fn record_call_end(&self, ctx: &TurnContext, response: &ModelResponse) {
        let ledger = ctx.ledger();
        let markers = ledger.markers(response.call_id).await;

        let call = self.builder.call_context(ctx.identity(), markers.as_ref());
        let primary = ReportBuilder::build(
            &call,
            extract_metrics(response),
            response.text(),
            InteractionKind::Primary,
        );
        ledger.append(primary.clone()).await;

        let side_reports = enrich_side_reports(&primary, &ledger.take_side_reports().await);
        ledger.append_all(side_reports.iter().cloned()).await;

        match &markers {
            Some(markers) => {
                let post = ctx.snapshot().snapshot().await;
                let baseline = ledger.claim_window(markers, &post, &side_reports).await;
                match unaccounted_reports(&baseline, &post, &primary, &side_reports) {
                    Ok(unaccounted) => ledger.append_all(unaccounted).await,
                    Err(e) => warn!(
                        call_id = %response.call_id,
                        error = %e,
                        "Usage reconciliation failed, keeping explicit reports only"
                    ),
                }
            }
            None => debug!(
                call_id = %response.call_id,
                "No start markers for call, skipping reconciliation"
            ),
        }

        ledger.snapshot_clear_markers(response.call_id).await;
    }

    async fn record_side_channel(&self, ctx: &TurnContext, call: SideChannelCall) {
        ctx.snapshot().record_metrics(&call.model, &call.usage).await;

        let report = ReportBuilder::side_channel(
            &call.model,
            call.prompt,
            call.response_text,
            call.usage,
            call.execution_time_ms,
        );
        debug!(
            model = %report.model_identifier,
            total_tokens = report.total_tokens(),
            "Side-channel report buffered"
        );
        ctx.ledger().enqueue_side_report(report).await;
    }

    async fn flush_turn(&self, ctx: &TurnContext) -> FlushHandle {
        let ledger = ctx.ledger();

        // Side reports no primary call picked up are still usage.
        let leftovers = ledger.take_side_reports().await;
        if !leftovers.is_empty() {
            let call = self.builder.call_context(ctx.identity(), None);
            let base = ReportBuilder::build(
                &call,
                UsageMetrics::default(),
                None,
                InteractionKind::Primary,
            );
            ledger.append_all(enrich_side_reports(&base, &leftovers)).await;
        }

        let reports = ledger.drain().await;
        if reports.is_empty() {
            return FlushHandle::noop();
        }

        let session_id = ctx.session_id().map(str::to_string);
        info!(
            session_id = session_id.as_deref().unwrap_or("-"),
            reports = reports.len(),
            "Flushing turn usage"
        );

        let markdown = if self.performance.enabled {
            let markdown = performance::render_markdown(&reports, ctx.identity());
            if self.performance.log {
                info!("{}", markdown);
            }
            ctx.set_state(LAST_PERFORMANCE_REPORT, markdown.clone()).await;
            Some(markdown)
        } else {
            None
        };

        let persistence = Arc::clone(&self.persistence);
        let timeout = self.persist_timeout;
        let performance = self.performance.clone();

        let handle = tokio::spawn(async move {
            // First use builds the service, so construction counts against the bound.
            let save = async {
                match persistence.get().await {
                    Some(service) => Some(service.save_reports_batch(&reports).await),
                    None => {
                        debug!(reports = reports.len(), "Persistence not configured, dropping usage batch");
                        None
                    }
                }
            };
            let outcome = match tokio::time::timeout(timeout, save).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        timeout_secs = timeout.as_secs_f64(),
                        reports = reports.len(),
                        "Usage persistence timed out"
                    );
                    None
                }
            };

            if let Some(markdown) = markdown.filter(|_| performance.save) {
                let session = session_id.as_deref().unwrap_or("unknown");
                match performance::save_report(&performance.dir, session, &markdown).await {
                    Ok(path) => info!(path = %path.display(), "Performance report saved"),
                    Err(e) => error!(error = %e, "Failed to save performance report"),
                }
            }

            outcome
        });

        FlushHandle(Some(handle))
    }
}

#[async_trait]
impl ModelCallbacks for UsageHooks {
    async fn before_model(&self, ctx: &TurnContext, request: &ModelRequest) -> HookOutcome {
        if AssertUnwindSafe(self.record_call_start(ctx, request))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(call_id = %request.call_id, "before_model hook panicked");
        }
        HookOutcome::Continue
    }

    async fn after_model(&self, ctx: &TurnContext, response: &ModelResponse) -> HookOutcome {
        if AssertUnwindSafe(self.record_call_end(ctx, response))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(call_id = %response.call_id, "after_model hook panicked");
        }
        HookOutcome::Continue
    }

    async fn on_side_channel(&self, ctx: &TurnContext, call: SideChannelCall) -> HookOutcome {
        let model = call.model.clone();
        if AssertUnwindSafe(self.record_side_channel(ctx, call))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(model = %model, "on_side_channel hook panicked");
        }
        HookOutcome::Continue
    }

    async fn after_turn(&self, ctx: &TurnContext) -> FlushHandle {
        match AssertUnwindSafe(self.flush_turn(ctx)).catch_unwind().await {
            Ok(handle) => handle,
            Err(_) => {
                error!("after_turn hook panicked");
                // Whatever the panic left behind must not leak into the next turn.
                ctx.ledger().drain().await;
                FlushHandle::noop()
            }
        }
    }
}

impl std::fmt::Debug for UsageHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageHooks")
            .field("builder", &self.builder)
            .field("persistence", &self.persistence)
            .field("persist_timeout", &self.persist_timeout)
            .finish()
    }
}
