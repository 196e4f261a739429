//! BigQuery provider
//!
//! Streams reports into a table through the REST `tabledata.insertAll` call.
//! Every row carries its own `insertId` so BigQuery can deduplicate retries, and
//! invalid rows are skipped rather than failing the whole batch.

use super::provider::{BatchOutcome, PersistenceProvider, RowError};
use crate::config::BigQueryConfig;
use crate::error::{Error, Result};
use crate::usage::UsageReport;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const REQUEST_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllRequest {
    kind: &'static str,
    skip_invalid_rows: bool,
    ignore_unknown_values: bool,
    rows: Vec<InsertRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRow {
    insert_id: String,
    json: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertAllResponse {
    #[serde(default)]
    insert_errors: Vec<InsertErrors>,
}

#[derive(Debug, Deserialize)]
struct InsertErrors {
    index: usize,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: i32,
    message: String,
}

// ============================================================================
// Provider
// ============================================================================

/// BigQuery `insertAll` provider
pub struct BigQueryProvider {
    client: Client,
    endpoint: String,
    table_ref: String,
    access_token: Option<String>,
}

impl BigQueryProvider {
    /// Create a provider for the configured table.
    ///
    /// Fails when project, dataset or table id is missing.
    pub fn new(config: &BigQueryConfig) -> Result<Self> {
        let (Some(project), Some(dataset), Some(table), Some(table_ref)) = (
            config.project_id.as_deref(),
            config.dataset_id.as_deref(),
            config.table_id.as_deref(),
            config.table_ref(),
        ) else {
            return Err(Error::Configuration(
                "BigQuery requires project, dataset and table ids".to_string(),
            ));
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let endpoint = format!(
            "{}/projects/{}/datasets/{}/tables/{}/insertAll",
            config.base_url.trim_end_matches('/'),
            project,
            dataset,
            table
        );

        Ok(Self {
            client,
            endpoint,
            table_ref,
            access_token: config.access_token.clone(),
        })
    }

    /// `project.dataset.table` this provider writes to
    #[must_use]
    pub fn table_ref(&self) -> &str {
        &self.table_ref
    }

    fn build_request(reports: &[UsageReport]) -> Result<InsertAllRequest> {
        let rows = reports
            .iter()
            .map(|report| -> Result<InsertRow> {
                Ok(InsertRow {
                    insert_id: Uuid::new_v4().to_string(),
                    json: serde_json::to_value(report)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(InsertAllRequest {
            kind: "bigquery#tableDataInsertAllRequest",
            skip_invalid_rows: true,
            ignore_unknown_values: false,
            rows,
        })
    }

    fn parse_body(status: reqwest::StatusCode, body: &str, attempted: usize) -> Result<BatchOutcome> {
        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ApiError>(body) {
                warn!(
                    error_code = error.error.code,
                    error_message = %error.error.message,
                    "BigQuery API error detail"
                );
                return Err(Error::Persistence(error.error.message));
            }
            return Err(Error::Persistence(format!("HTTP {status}")));
        }

        let response: InsertAllResponse = if body.trim().is_empty() {
            InsertAllResponse::default()
        } else {
            serde_json::from_str(body)?
        };

        // BigQuery may list one row several times; collapse by index.
        let mut by_index: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for entry in response.insert_errors {
            let reasons = by_index.entry(entry.index).or_default();
            reasons.extend(entry.errors.into_iter().map(|e| {
                if e.message.is_empty() {
                    e.reason
                } else {
                    format!("{}: {}", e.reason, e.message)
                }
            }));
        }

        let row_errors: Vec<RowError> = by_index
            .into_iter()
            .map(|(index, reasons)| RowError {
                index,
                reason: reasons.join("; "),
            })
            .collect();

        Ok(BatchOutcome {
            attempted,
            inserted: attempted.saturating_sub(row_errors.len()),
            row_errors,
        })
    }
}

impl std::fmt::Debug for BigQueryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BigQueryProvider")
            .field("table_ref", &self.table_ref)
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[async_trait]
impl PersistenceProvider for BigQueryProvider {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    async fn persist_batch(&self, reports: &[UsageReport]) -> Result<BatchOutcome> {
        if reports.is_empty() {
            return Ok(BatchOutcome::default());
        }

        debug!(table = %self.table_ref, rows = reports.len(), "Inserting rows into BigQuery");

        let request = Self::build_request(reports)?;
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        Self::parse_body(status, &body, reports.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usage::{InteractionKind, UsageMetrics};
    use reqwest::StatusCode;

    fn config() -> BigQueryConfig {
        BigQueryConfig {
            project_id: Some("proj".to_string()),
            dataset_id: Some("finops".to_string()),
            table_id: Some("usage".to_string()),
            access_token: Some("secret-token".to_string()),
            base_url: "http://localhost:9050/bigquery/v2/".to_string(),
        }
    }

    #[test]
    fn test_new_requires_identifiers() {
        let mut incomplete = config();
        incomplete.table_id = None;

        assert!(matches!(
            BigQueryProvider::new(&incomplete),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_endpoint_and_redaction() {
        let provider = BigQueryProvider::new(&config()).unwrap();

        assert_eq!(
            provider.endpoint,
            "http://localhost:9050/bigquery/v2/projects/proj/datasets/finops/tables/usage/insertAll"
        );
        assert_eq!(provider.table_ref(), "proj.finops.usage");
        let debug = format!("{provider:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_request_rows_are_flat() {
        let reports = vec![
            UsageReport::new("a", UsageMetrics::new(1, 2, 0, 0, 3), InteractionKind::Primary),
            UsageReport::new("b", UsageMetrics::default(), InteractionKind::Unaccounted),
        ];
        let request = BigQueryProvider::build_request(&reports).unwrap();
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["skipInvalidRows"], true);
        assert_eq!(value["rows"].as_array().map(Vec::len), Some(2));
        assert_eq!(value["rows"][0]["json"]["total_tokens"], 3);
        assert_eq!(value["rows"][1]["json"]["interaction_kind"], "unaccounted");
        assert_ne!(value["rows"][0]["insertId"], value["rows"][1]["insertId"]);
    }

    #[test]
    fn test_parse_success_without_errors() {
        let outcome =
            BigQueryProvider::parse_body(StatusCode::OK, r#"{"kind":"bigquery#tableDataInsertAllResponse"}"#, 3)
                .unwrap();

        assert_eq!(outcome, BatchOutcome::all_inserted(3));
    }

    #[test]
    fn test_parse_row_errors() {
        let body = r#"{
            "insertErrors": [
                {"index": 2, "errors": [{"reason": "invalid", "location": "total_tokens", "message": "not an integer"}]},
                {"index": 0, "errors": [{"reason": "stopped", "message": ""}]},
                {"index": 2, "errors": [{"reason": "invalid", "message": "bad timestamp"}]}
            ]
        }"#;

        let outcome = BigQueryProvider::parse_body(StatusCode::OK, body, 4).unwrap();

        assert_eq!(outcome.attempted, 4);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(
            outcome.row_errors,
            vec![
                RowError {
                    index: 0,
                    reason: "stopped".to_string()
                },
                RowError {
                    index: 2,
                    reason: "invalid: not an integer; invalid: bad timestamp".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_api_error() {
        let body = r#"{"error":{"code":404,"message":"Not found: Table proj:finops.usage"}}"#;

        let result = BigQueryProvider::parse_body(StatusCode::NOT_FOUND, body, 1);

        assert!(matches!(result, Err(Error::Persistence(msg)) if msg.contains("Not found")));
    }
}
