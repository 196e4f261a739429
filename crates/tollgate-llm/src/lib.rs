//! Tollgate LLM - Model call surface
//!
//! This crate holds the types the host agent framework hands to the usage hooks:
//! - Message: `ModelRequest` / `ModelResponse` and their content parts
//! - Invoker: the `ModelInvoker` capability used by auxiliary (side-channel) calls
//! - Gemini: a REST `generateContent` invoker

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod gemini;
pub mod invoker;
pub mod message;

pub use error::{Error, Result};
pub use gemini::{GeminiConfig, GeminiInvoker};
pub use invoker::ModelInvoker;
pub use message::{CallId, Content, ModelRequest, ModelResponse, Part, UsageMetadata};
