//! Persistence provider trait

use crate::error::Result;
use crate::usage::UsageReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A row the backend refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// Position of the row in the submitted batch
    pub index: usize,
    /// Backend's reason
    pub reason: String,
}

/// Result of one batch write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Rows submitted
    pub attempted: usize,
    /// Rows the backend accepted
    pub inserted: usize,
    /// Per-row failures
    pub row_errors: Vec<RowError>,
}

impl BatchOutcome {
    /// Outcome for a batch the backend accepted in full
    #[must_use]
    pub fn all_inserted(attempted: usize) -> Self {
        Self {
            attempted,
            inserted: attempted,
            row_errors: Vec::new(),
        }
    }

    /// True when at least one row was refused
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.row_errors.is_empty()
    }
}

/// Backend strategy for writing usage reports.
///
/// Implementations report row-level rejections through [`BatchOutcome`] and
/// reserve `Err` for failures of the whole request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistenceProvider: Send + Sync {
    /// Provider name (for logging)
    fn name(&self) -> &'static str;

    /// Write a batch of reports
    async fn persist_batch(&self, reports: &[UsageReport]) -> Result<BatchOutcome>;

    /// Write one report
    async fn persist(&self, report: &UsageReport) -> Result<BatchOutcome> {
        self.persist_batch(std::slice::from_ref(report)).await
    }
}
