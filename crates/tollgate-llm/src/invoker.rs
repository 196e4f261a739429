//! Auxiliary model invocation

use crate::error::Result;
use crate::message::ModelResponse;

/// Capability to issue a single prompt against a named model.
///
/// Only side-channel work (e.g. translating thoughts) goes through this trait;
/// primary calls are made by the host framework.
#[async_trait::async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Invoker name (for logging)
    fn name(&self) -> &str;

    /// Send `prompt` to `model` and return the raw response
    async fn generate(&self, model: &str, prompt: &str) -> Result<ModelResponse>;
}
