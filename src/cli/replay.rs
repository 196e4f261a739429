//! `tollgate replay`
//!
//! Runs a recorded turn through the usage hooks the way an agent host would:
//! before-model, side-channel calls, snapshot update, optional thought
//! translation, after-model, and finally the turn-end flush.
//!
//! Script format (JSON):
//!
//! ```json
//! {
//!   "session_id": "s-1",
//!   "calls": [{
//!     "model": "gemini-2.5-pro",
//!     "prompt": "plan the trip",
//!     "response": { "content": { "parts": [{ "text": "..." }] },
//!                   "usageMetadata": { "promptTokenCount": 100, "totalTokenCount": 160 } },
//!     "side_channels": [{ "model": "gemini-2.5-flash-lite", "usage": { "totalTokenCount": 10 } }],
//!     "host_usage": [{ "model": "grader", "total": 8 }]
//!   }]
//! }
//! ```

use crate::loader::load_config;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tollgate_core::{
    extract_metrics, BatchOutcome, LazyPersistence, ModelCallbacks, SideChannelCall,
    ThoughtTranslator, TurnContext, TurnIdentity, UsageHooks, LAST_PERFORMANCE_REPORT,
};
use tollgate_llm::{GeminiConfig, GeminiInvoker, ModelRequest, ModelResponse, UsageMetadata};
use tracing::info;

/// One recorded turn
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TurnScript {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub calls: Vec<ScriptedCall>,
}

/// One primary model call of a recorded turn
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedCall {
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub response: ModelResponse,
    /// Auxiliary calls made while the primary call was running
    #[serde(default)]
    pub side_channels: Vec<ScriptedSideChannel>,
    /// Usage the host recorded during the call without reporting it
    #[serde(default)]
    pub host_usage: Vec<HostUsage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedSideChannel {
    pub model: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub response_text: Option<String>,
    #[serde(default)]
    pub usage: UsageMetadata,
    #[serde(default)]
    pub execution_time_ms: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostUsage {
    pub model: String,
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub total: u64,
}

/// What a replayed turn produced
#[derive(Debug, Default)]
pub struct ReplaySummary {
    /// Persistence result, `None` when nothing was written
    pub outcome: Option<BatchOutcome>,
    /// Rendered performance report, when enabled
    pub performance_report: Option<String>,
}

pub async fn run(path: &Path, translate: bool) -> Result<()> {
    let config = load_config().context("Failed to load configuration")?;

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read turn script {}", path.display()))?;
    let script: TurnScript = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse turn script {}", path.display()))?;

    let translator = if translate {
        let gemini = GeminiConfig::from_env().context("Translation needs GEMINI_API_KEY")?;
        let invoker = GeminiInvoker::new(gemini).context("Failed to create Gemini invoker")?;
        Some(ThoughtTranslator::new(Arc::new(invoker), &config.translation))
    } else {
        None
    };

    let persistence = LazyPersistence::from_config(config.persistence.clone());
    let hooks = UsageHooks::new(&config, Arc::new(persistence));

    info!(calls = script.calls.len(), path = %path.display(), "Replaying turn");
    let summary = replay_turn(&hooks, translator.as_ref(), &script).await;

    if let Some(report) = &summary.performance_report {
        println!("{report}");
    }
    match &summary.outcome {
        Some(outcome) => println!(
            "Persisted {}/{} reports ({} row errors)",
            outcome.inserted,
            outcome.attempted,
            outcome.row_errors.len()
        ),
        None => println!("No reports persisted"),
    }

    Ok(())
}

/// Drive one scripted turn through `hooks` and wait for its flush
pub async fn replay_turn(
    hooks: &UsageHooks,
    translator: Option<&ThoughtTranslator>,
    script: &TurnScript,
) -> ReplaySummary {
    let ctx = TurnContext::new(TurnIdentity {
        user_id: script.user_id.clone(),
        session_id: script.session_id.clone(),
        invocation_id: script.invocation_id.clone(),
    });

    for call in &script.calls {
        let request = ModelRequest::new(call.model.as_str(), call.prompt.as_str());
        hooks.before_model(&ctx, &request).await;

        for side in &call.side_channels {
            let usage = extract_metrics(&ModelResponse {
                usage_metadata: Some(side.usage.clone()),
                ..Default::default()
            });
            let side_call = SideChannelCall {
                model: side.model.clone(),
                prompt: side.prompt.clone(),
                response_text: side.response_text.clone(),
                usage,
                execution_time_ms: side.execution_time_ms,
            };
            hooks.on_side_channel(&ctx, side_call).await;
        }

        let mut response = ModelResponse {
            call_id: request.call_id,
            ..call.response.clone()
        };
        record_host_usage(&ctx, call, &response).await;

        if let Some(translator) = translator {
            translator.translate_response(&ctx, hooks, &mut response).await;
        }

        hooks.after_model(&ctx, &response).await;
    }

    let outcome = hooks.after_turn(&ctx).await.wait().await;
    let performance_report = ctx
        .state(LAST_PERFORMANCE_REPORT)
        .await
        .and_then(|v| v.as_str().map(str::to_string));

    ReplaySummary {
        outcome,
        performance_report,
    }
}

/// The host's own snapshot bookkeeping for a primary call
async fn record_host_usage(ctx: &TurnContext, call: &ScriptedCall, response: &ModelResponse) {
    if let Some(meta) = &response.usage_metadata {
        ctx.snapshot()
            .record(
                &call.model,
                meta.prompt_token_count.unwrap_or(0),
                meta.candidates_token_count.unwrap_or(0),
                meta.total_token_count.unwrap_or(0),
            )
            .await;
    }
    for extra in &call.host_usage {
        ctx.snapshot()
            .record(&extra.model, extra.input, extra.output, extra.total)
            .await;
    }
}
