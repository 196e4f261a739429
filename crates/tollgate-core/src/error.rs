//! Error types for tollgate-core
//!
//! None of these escape a lifecycle hook: hooks log them and return a neutral
//! outcome. They exist so the building blocks (reconciliation, persistence,
//! report artifacts) can be composed and tested with `?`.

use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Delta computation failed (counter overflow, inconsistent snapshot)
    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    /// Backend rejected the batch or could not be reached
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Local database error
    #[error("database error: {0}")]
    Database(String),

    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Report serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Report artifact could not be written
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Side-channel model call failed
    #[error("llm error: {0}")]
    Llm(#[from] tollgate_llm::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
