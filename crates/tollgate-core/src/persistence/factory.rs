//! Provider selection from configuration

use super::bigquery::BigQueryProvider;
use super::provider::PersistenceProvider;
use super::service::PersistenceService;
use super::sqlite::SqliteProvider;
use crate::config::PersistenceConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Supported persistence backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// BigQuery streaming inserts
    BigQuery,
    /// Local SQLite database
    Sqlite,
}

impl ProviderKind {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BigQuery => "bigquery",
            Self::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "bigquery" => Ok(Self::BigQuery),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(Error::Configuration(format!(
                "unknown persistence provider: {other}"
            ))),
        }
    }
}

/// Builds the persistence service the configuration asks for
pub struct PersistenceFactory;

impl PersistenceFactory {
    /// Create the configured service.
    ///
    /// Returns `None` when persistence is disabled (empty provider), the
    /// provider is unknown, required settings are missing, or the backend could
    /// not be initialized. Every case except the first is logged.
    pub async fn create_service(config: &PersistenceConfig) -> Option<PersistenceService> {
        if config.provider.trim().is_empty() {
            info!("No persistence provider configured, usage reports will not be stored");
            return None;
        }

        let kind = match config.provider.parse::<ProviderKind>() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "Persistence disabled");
                return None;
            }
        };

        match Self::create_provider(kind, config).await {
            Ok(provider) => {
                info!(provider = provider.name(), "Persistence service initialized");
                Some(PersistenceService::new(provider))
            }
            Err(Error::Configuration(msg)) => {
                warn!(provider = %kind, reason = %msg, "Persistence disabled");
                None
            }
            Err(e) => {
                error!(provider = %kind, error = %e, "Failed to initialize persistence provider");
                None
            }
        }
    }

    async fn create_provider(
        kind: ProviderKind,
        config: &PersistenceConfig,
    ) -> Result<Arc<dyn PersistenceProvider>> {
        match kind {
            ProviderKind::BigQuery => {
                let provider = BigQueryProvider::new(&config.bigquery)?;
                Ok(Arc::new(provider))
            }
            ProviderKind::Sqlite => {
                let path = match &config.sqlite_path {
                    Some(path) => path.clone(),
                    None => SqliteProvider::default_path()?,
                };
                let provider = SqliteProvider::from_path(&path).await?;
                Ok(Arc::new(provider))
            }
        }
    }
}
