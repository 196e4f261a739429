//! Thought translation
//!
//! Rewrites the reasoning ("thought") parts of a model response into another
//! language through an auxiliary model call. Every translation is a side
//! channel: its usage is reported through [`ModelCallbacks::on_side_channel`]
//! so it is attributed to the translation model, not the primary one.

use crate::config::TranslationConfig;
use crate::context::TurnContext;
use crate::error::Result;
use crate::hooks::{ModelCallbacks, SideChannelCall};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tollgate_llm::{ModelInvoker, ModelResponse};
use tracing::{info, warn};

/// Texts shorter than this (after trimming) are not worth a model call
pub const MIN_TEXT_LENGTH: usize = 10;

/// Translates thought parts through an auxiliary model
pub struct ThoughtTranslator {
    invoker: Arc<dyn ModelInvoker>,
    model: String,
    target_language: String,
}

impl ThoughtTranslator {
    /// Create a translator
    pub fn new(invoker: Arc<dyn ModelInvoker>, config: &TranslationConfig) -> Self {
        Self {
            invoker,
            model: config.model.clone(),
            target_language: config.target_language.clone(),
        }
    }

    /// Model the translations run on
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn prompt(&self, text: &str) -> String {
        format!(
            "Translate the following text into {}. Return ONLY the translation, without explanations:\n\n{}",
            self.target_language, text
        )
    }

    async fn translate(&self, text: &str) -> Result<(String, ModelResponse, Duration)> {
        let started = Instant::now();
        let response = self.invoker.generate(&self.model, &self.prompt(text)).await?;
        let elapsed = started.elapsed();

        let translated = response
            .text()
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        Ok((translated, response, elapsed))
    }

    /// Translate every thought part of `response` in place.
    ///
    /// Short texts and failed translations are left unchanged. Returns whether
    /// any part was rewritten.
    pub async fn translate_response(
        &self,
        ctx: &TurnContext,
        hooks: &dyn ModelCallbacks,
        response: &mut ModelResponse,
    ) -> bool {
        let Some(content) = response.content.as_mut() else {
            return false;
        };

        let mut modified = false;
        for part in content.parts.iter_mut().filter(|p| p.thought) {
            let Some(original) = part.text.clone() else {
                continue;
            };
            if original.trim().chars().count() < MIN_TEXT_LENGTH {
                continue;
            }

            let (translated, aux, elapsed) = match self.translate(&original).await {
                Ok(result) if !result.0.is_empty() => result,
                Ok(_) => {
                    warn!(model = %self.model, "Translation returned no text, keeping original");
                    continue;
                }
                Err(e) => {
                    warn!(model = %self.model, error = %e, "Translation failed, keeping original");
                    continue;
                }
            };

            if aux.usage_metadata.is_some() {
                let mut call = SideChannelCall::from_response(&self.model, original.as_str(), &aux, elapsed);
                call.response_text = Some(translated.clone());
                info!(
                    model = %self.model,
                    total_tokens = call.usage.total_tokens,
                    "Thought translation accounted"
                );
                hooks.on_side_channel(ctx, call).await;
            }

            part.text = Some(translated);
            modified = true;
        }

        modified
    }
}

impl std::fmt::Debug for ThoughtTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThoughtTranslator")
            .field("invoker", &self.invoker.name())
            .field("model", &self.model)
            .field("target_language", &self.target_language)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TollgateConfig;
    use crate::hooks::UsageHooks;
    use crate::persistence::LazyPersistence;
    use crate::usage::InteractionKind;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tollgate_llm::{Content, Part, UsageMetadata};

    /// Invoker that upper-cases the text after the prompt header
    struct UppercaseInvoker {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    impl UppercaseInvoker {
        fn new(fail: bool) -> Self {
            Self {
                prompts: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl ModelInvoker for UppercaseInvoker {
        fn name(&self) -> &str {
            "uppercase"
        }

        async fn generate(&self, _model: &str, prompt: &str) -> tollgate_llm::Result<ModelResponse> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(tollgate_llm::Error::Api("quota exceeded".to_string()));
            }
            let text = prompt.rsplit("\n\n").next().unwrap_or_default().to_uppercase();
            Ok(ModelResponse {
                content: Some(Content::model(vec![Part::text(format!("  {text}  "))])),
                usage_metadata: Some(UsageMetadata {
                    prompt_token_count: Some(12),
                    candidates_token_count: Some(8),
                    total_token_count: Some(20),
                    ..Default::default()
                }),
                ..Default::default()
            })
        }
    }

    fn response() -> ModelResponse {
        ModelResponse {
            content: Some(Content::model(vec![
                Part::thought("considering the options carefully"),
                Part::thought("short"),
                Part::text("final answer text"),
            ])),
            ..Default::default()
        }
    }

    fn hooks() -> UsageHooks {
        UsageHooks::new(&TollgateConfig::default(), Arc::new(LazyPersistence::disabled()))
    }

    #[tokio::test]
    async fn test_translates_long_thoughts_only() {
        let invoker = Arc::new(UppercaseInvoker::new(false));
        let translator = ThoughtTranslator::new(invoker.clone(), &TranslationConfig::default());
        let ctx = TurnContext::default();
        let mut response = response();

        let modified = translator.translate_response(&ctx, &hooks(), &mut response).await;

        assert!(modified);
        let parts = &response.content.as_ref().unwrap().parts;
        assert_eq!(parts[0].text.as_deref(), Some("CONSIDERING THE OPTIONS CAREFULLY"));
        assert!(parts[0].thought);
        assert_eq!(parts[1].text.as_deref(), Some("short"));
        assert_eq!(parts[2].text.as_deref(), Some("final answer text"));

        let prompts = invoker.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Brazilian Portuguese"));
    }

    #[tokio::test]
    async fn test_translation_is_a_side_channel() {
        let translator = ThoughtTranslator::new(
            Arc::new(UppercaseInvoker::new(false)),
            &TranslationConfig::default(),
        );
        let ctx = TurnContext::default();
        let mut response = response();

        translator.translate_response(&ctx, &hooks(), &mut response).await;

        let counters = ctx.snapshot().get(translator.model()).await.unwrap();
        assert_eq!(counters.total, 20);

        let side = ctx.ledger().take_side_reports().await;
        assert_eq!(side.len(), 1);
        assert_eq!(side[0].interaction_kind, InteractionKind::SideChannel);
        assert_eq!(side[0].model_identifier, "gemini-2.5-flash-lite");
        assert_eq!(side[0].user_prompt, "considering the options carefully");
        assert_eq!(side[0].response_text, "CONSIDERING THE OPTIONS CAREFULLY");
        assert_eq!(side[0].usage.reasoning_tokens, 0);
    }

    #[tokio::test]
    async fn test_failed_translation_keeps_text() {
        let translator = ThoughtTranslator::new(
            Arc::new(UppercaseInvoker::new(true)),
            &TranslationConfig::default(),
        );
        let ctx = TurnContext::default();
        let mut response = response();

        let modified = translator.translate_response(&ctx, &hooks(), &mut response).await;

        assert!(!modified);
        let parts = &response.content.as_ref().unwrap().parts;
        assert_eq!(parts[0].text.as_deref(), Some("considering the options carefully"));
        assert!(ctx.ledger().take_side_reports().await.is_empty());
        assert!(ctx.snapshot().snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_response_without_content() {
        let translator = ThoughtTranslator::new(
            Arc::new(UppercaseInvoker::new(false)),
            &TranslationConfig::default(),
        );
        let mut response = ModelResponse::default();

        assert!(!translator
            .translate_response(&TurnContext::default(), &hooks(), &mut response)
            .await);
    }
}
