//! Persistence service and its lazy cell

use super::factory::PersistenceFactory;
use super::provider::{BatchOutcome, PersistenceProvider};
use crate::config::PersistenceConfig;
use crate::usage::UsageReport;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

/// Writes report batches through a provider and absorbs every failure
#[derive(Clone)]
pub struct PersistenceService {
    provider: Arc<dyn PersistenceProvider>,
}

impl PersistenceService {
    /// Wrap a provider
    #[must_use]
    pub fn new(provider: Arc<dyn PersistenceProvider>) -> Self {
        Self { provider }
    }

    /// Name of the underlying provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Write a batch of reports.
    ///
    /// Never fails: provider errors and rejected rows are logged and reflected
    /// in the returned outcome.
    pub async fn save_reports_batch(&self, reports: &[UsageReport]) -> BatchOutcome {
        if reports.is_empty() {
            return BatchOutcome::default();
        }

        let provider = self.provider.name();
        match self.provider.persist_batch(reports).await {
            Ok(outcome) => {
                for row in &outcome.row_errors {
                    let report = reports.get(row.index);
                    error!(
                        provider,
                        index = row.index,
                        reason = %row.reason,
                        model = report.map(|r| r.model_identifier.as_str()).unwrap_or("?"),
                        kind = report.map(|r| r.interaction_kind.as_str()).unwrap_or("?"),
                        "Usage row rejected"
                    );
                }
                if outcome.has_errors() {
                    error!(
                        provider,
                        attempted = outcome.attempted,
                        inserted = outcome.inserted,
                        "Usage batch partially persisted"
                    );
                } else {
                    info!(provider, rows = outcome.inserted, "Usage batch persisted");
                }
                outcome
            }
            Err(e) => {
                error!(provider, rows = reports.len(), error = %e, "Failed to persist usage batch");
                BatchOutcome {
                    attempted: reports.len(),
                    inserted: 0,
                    row_errors: Vec::new(),
                }
            }
        }
    }
}

impl std::fmt::Debug for PersistenceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceService")
            .field("provider", &self.provider.name())
            .finish()
    }
}

type ServiceBuilder = Box<dyn Fn() -> BoxFuture<'static, Option<PersistenceService>> + Send + Sync>;

/// Once-only, deferred construction of the persistence service.
///
/// The builder runs on the first `get()`; later and concurrent callers wait
/// for and share that result. A builder that yields `None` (persistence not
/// configured) is not retried.
pub struct LazyPersistence {
    builder: ServiceBuilder,
    cell: OnceCell<Option<Arc<PersistenceService>>>,
}

impl LazyPersistence {
    /// Cell backed by a custom builder
    pub fn new<F, Fut>(builder: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<PersistenceService>> + Send + 'static,
    {
        Self {
            builder: Box::new(move || builder().boxed()),
            cell: OnceCell::new(),
        }
    }

    /// Cell that builds the service from configuration via [`PersistenceFactory`]
    #[must_use]
    pub fn from_config(config: PersistenceConfig) -> Self {
        Self::new(move || {
            let config = config.clone();
            async move { PersistenceFactory::create_service(&config).await }
        })
    }

    /// Cell already holding `service`
    #[must_use]
    pub fn ready(service: PersistenceService) -> Self {
        Self {
            builder: Box::new(|| futures::future::ready(None).boxed()),
            cell: OnceCell::new_with(Some(Some(Arc::new(service)))),
        }
    }

    /// Cell that never yields a service
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            builder: Box::new(|| futures::future::ready(None).boxed()),
            cell: OnceCell::new_with(Some(None)),
        }
    }

    /// The service, building it on first use
    pub async fn get(&self) -> Option<Arc<PersistenceService>> {
        self.cell
            .get_or_init(|| async { (self.builder)().await.map(Arc::new) })
            .await
            .clone()
    }

    /// Whether the builder has already run
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }
}

impl std::fmt::Debug for LazyPersistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyPersistence")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
