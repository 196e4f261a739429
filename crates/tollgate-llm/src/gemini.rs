//! Gemini - `generateContent` REST invoker
//!
//! A small client: one prompt in, one `ModelResponse` out. It is used
//! for side-channel work such as translating thoughts, never for the primary call.

use crate::error::{Error, Result};
use crate::invoker::ModelInvoker;
use crate::message::{CallId, Content, ModelResponse, UsageMetadata};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the API key
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: i32,
    message: String,
}

impl GeminiResponse {
    fn into_model_response(self) -> ModelResponse {
        ModelResponse {
            call_id: CallId::new(),
            content: self.candidates.into_iter().find_map(|c| c.content),
            usage_metadata: self.usage_metadata,
        }
    }
}

// ============================================================================
// Invoker
// ============================================================================

/// Gemini invoker configuration
#[derive(Clone)]
pub struct GeminiConfig {
    /// API key (sent as `?key=`)
    pub api_key: String,
    /// Base URL
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl GeminiConfig {
    /// Configuration with the default endpoint
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Configuration from `GEMINI_API_KEY`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var(ENV_GEMINI_API_KEY)
            .map_err(|_| Error::NotConfigured(ENV_GEMINI_API_KEY.to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Override the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Gemini `generateContent` invoker
pub struct GeminiInvoker {
    client: Client,
    config: GeminiConfig,
}

impl GeminiInvoker {
    /// Create a new invoker
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn parse_body(status: reqwest::StatusCode, body: &str) -> Result<ModelResponse> {
        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<GeminiError>(body) {
                warn!(
                    error_code = error.error.code,
                    error_message = %error.error.message,
                    "Gemini API error detail"
                );
                return Err(Error::Api(error.error.message));
            }
            return Err(Error::Api(format!("HTTP {status}")));
        }

        let response: GeminiResponse =
            serde_json::from_str(body).map_err(|e| Error::InvalidResponse(e.to_string()))?;
        Ok(response.into_model_response())
    }
}

#[async_trait::async_trait]
impl ModelInvoker for GeminiInvoker {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<ModelResponse> {
        // The URL carries the key, so only the model is logged.
        debug!(model = %model, "Sending side-channel request to Gemini");

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.config.base_url, model, self.config.api_key
        );
        let request = GeminiRequest {
            contents: vec![Content::user(prompt)],
        };

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        Self::parse_body(status, &body)
    }
}
