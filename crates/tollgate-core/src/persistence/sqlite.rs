//! SQLite provider
//!
//! Local usage store for development and single-node deployments. A batch is
//! written inside one transaction; rows SQLite refuses are reported individually
//! and the rest of the batch still commits.

use super::provider::{BatchOutcome, PersistenceProvider, RowError};
use crate::error::{Error, Result};
use crate::usage::{InteractionKind, UsageMetrics, UsageReport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// SQLite usage store
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    pool: SqlitePool,
}

impl SqliteProvider {
    /// Open (or create) the database at `path`
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Database(format!("Failed to create database directory: {e}"))
            })?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let provider = Self { pool };
        provider.run_migrations().await?;

        info!(path = %path.display(), "SQLite usage store initialized");
        Ok(provider)
    }

    /// In-memory database (for testing)
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: is its own database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let provider = Self { pool };
        provider.run_migrations().await?;
        Ok(provider)
    }

    /// Default database location (~/.tollgate/usage.db)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::Configuration("Could not determine home directory".to_string())
        })?;
        Ok(home.join(".tollgate").join("usage.db"))
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                session_id TEXT,
                invocation_id TEXT,
                app_name TEXT,
                base_url TEXT,
                user_prompt TEXT NOT NULL,
                response_text TEXT NOT NULL,
                input_tokens INTEGER NOT NULL,
                output_tokens INTEGER NOT NULL,
                reasoning_tokens INTEGER NOT NULL,
                cached_tokens INTEGER NOT NULL,
                total_tokens INTEGER NOT NULL,
                execution_time_ms REAL NOT NULL,
                model_identifier TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                interaction_kind TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_usage_reports_session ON usage_reports(session_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reports stored for a session, oldest first
    pub async fn reports_for_session(&self, session_id: &str) -> Result<Vec<UsageReport>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, session_id, invocation_id, app_name, base_url,
                   user_prompt, response_text,
                   input_tokens, output_tokens, reasoning_tokens, cached_tokens, total_tokens,
                   execution_time_ms, model_identifier, timestamp, interaction_kind
            FROM usage_reports
            WHERE session_id = ?1
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_report).collect()
    }

    /// Number of stored reports
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM usage_reports")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn row_to_report(row: &SqliteRow) -> Result<UsageReport> {
        let kind: String = row.try_get("interaction_kind")?;
        let timestamp: DateTime<Utc> = row.try_get("timestamp")?;

        Ok(UsageReport {
            user_id: row.try_get("user_id")?,
            session_id: row.try_get("session_id")?,
            invocation_id: row.try_get("invocation_id")?,
            app_name: row.try_get("app_name")?,
            base_url: row.try_get("base_url")?,
            user_prompt: row.try_get("user_prompt")?,
            response_text: row.try_get("response_text")?,
            usage: UsageMetrics {
                input_tokens: count_column(row, "input_tokens")?,
                output_tokens: count_column(row, "output_tokens")?,
                reasoning_tokens: count_column(row, "reasoning_tokens")?,
                cached_tokens: count_column(row, "cached_tokens")?,
                total_tokens: count_column(row, "total_tokens")?,
            },
            execution_time_ms: row.try_get("execution_time_ms")?,
            model_identifier: row.try_get("model_identifier")?,
            timestamp,
            interaction_kind: InteractionKind::from_str(&kind).map_err(Error::Database)?,
        })
    }
}

fn count_column(row: &SqliteRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| Error::Database(format!("negative {column}: {value}")))
}

/// SQLite integers are signed; counts above `i64::MAX` are refused per row.
fn sql_counts(usage: &UsageMetrics) -> std::result::Result<[i64; 5], String> {
    let convert = |value: u64, column: &str| {
        i64::try_from(value).map_err(|_| format!("{column} out of range: {value}"))
    };
    Ok([
        convert(usage.input_tokens, "input_tokens")?,
        convert(usage.output_tokens, "output_tokens")?,
        convert(usage.reasoning_tokens, "reasoning_tokens")?,
        convert(usage.cached_tokens, "cached_tokens")?,
        convert(usage.total_tokens, "total_tokens")?,
    ])
}

#[async_trait]
impl PersistenceProvider for SqliteProvider {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn persist_batch(&self, reports: &[UsageReport]) -> Result<BatchOutcome> {
        if reports.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut tx = self.pool.begin().await?;
        let mut row_errors = Vec::new();

        for (index, report) in reports.iter().enumerate() {
            let [input, output, reasoning, cached, total] = match sql_counts(&report.usage) {
                Ok(counts) => counts,
                Err(reason) => {
                    row_errors.push(RowError { index, reason });
                    continue;
                }
            };

            let result = sqlx::query(
                r#"
                INSERT INTO usage_reports (
                    user_id, session_id, invocation_id, app_name, base_url,
                    user_prompt, response_text,
                    input_tokens, output_tokens, reasoning_tokens, cached_tokens, total_tokens,
                    execution_time_ms, model_identifier, timestamp, interaction_kind
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            )
            .bind(&report.user_id)
            .bind(&report.session_id)
            .bind(&report.invocation_id)
            .bind(&report.app_name)
            .bind(&report.base_url)
            .bind(&report.user_prompt)
            .bind(&report.response_text)
            .bind(input)
            .bind(output)
            .bind(reasoning)
            .bind(cached)
            .bind(total)
            .bind(report.execution_time_ms)
            .bind(&report.model_identifier)
            .bind(report.timestamp)
            .bind(report.interaction_kind.as_str())
            .execute(&mut *tx)
            .await;

            if let Err(e) = result {
                row_errors.push(RowError {
                    index,
                    reason: e.to_string(),
                });
            }
        }

        tx.commit().await?;

        let outcome = BatchOutcome {
            attempted: reports.len(),
            inserted: reports.len() - row_errors.len(),
            row_errors,
        };
        debug!(
            inserted = outcome.inserted,
            attempted = outcome.attempted,
            "Usage rows written to SQLite"
        );
        Ok(outcome)
    }
}
