//! Configuration
//!
//! Every section deserializes with defaults (for the CLI's layered loader) and can
//! also be read straight from the process environment with `from_env()`, which is
//! how an embedding agent process usually wires the hooks. `apply_env()` overlays
//! the same variables on an already loaded configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

// ============================================================================
// Constants
// ============================================================================

/// Provider selector (`bigquery`, `sqlite`, or empty for none)
pub const ENV_PROVIDER_TYPE: &str = "FINOPS_PROVIDER_TYPE";
/// BigQuery project id
pub const ENV_BQ_PROJECT_ID: &str = "FINOPS_BQ_PROJECT_ID";
/// BigQuery dataset id
pub const ENV_BQ_DATASET_ID: &str = "FINOPS_BQ_DATASET_ID";
/// BigQuery table id
pub const ENV_BQ_TABLE_ID: &str = "FINOPS_BQ_TABLE_ID";
/// Bearer token for the BigQuery REST API
pub const ENV_BQ_ACCESS_TOKEN: &str = "FINOPS_BQ_ACCESS_TOKEN";
/// BigQuery REST base URL override
pub const ENV_BQ_BASE_URL: &str = "FINOPS_BQ_BASE_URL";
/// SQLite database path
pub const ENV_SQLITE_PATH: &str = "FINOPS_SQLITE_PATH";
/// Upper bound for the turn-end persistence call, in seconds
pub const ENV_PERSIST_TIMEOUT_SECS: &str = "FINOPS_PERSIST_TIMEOUT_SECS";
/// App name stamped on every report
pub const ENV_AGENT_APP_NAME: &str = "AGENT_APP_NAME";
/// Base URL stamped on every report
pub const ENV_AGENT_BASE_URL: &str = "AGENT_BASE_URL";
/// Performance report generation flag
pub const ENV_REPORT_ENABLED: &str = "PERFORMANCE_REPORT_ENABLED";
/// Performance report logging flag
pub const ENV_REPORT_LOG: &str = "PERFORMANCE_REPORT_LOG";
/// Performance report file flag
pub const ENV_REPORT_SAVE: &str = "PERFORMANCE_REPORT_SAVE";
/// Performance report output directory
pub const ENV_REPORT_DIR: &str = "PERFORMANCE_REPORT_DIR";
/// Side-channel translation model
pub const ENV_TRANSLATION_MODEL: &str = "TRANSLATION_MODEL";

/// Default app name
pub const DEFAULT_APP_NAME: &str = "default_agent_app";
/// Default base URL
pub const DEFAULT_BASE_URL: &str = "http://localhost";
/// Default BigQuery REST endpoint
pub const DEFAULT_BQ_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
/// Default persistence timeout
pub const DEFAULT_PERSIST_TIMEOUT_SECS: u64 = 10;
/// Default performance report directory
pub const DEFAULT_REPORT_DIR: &str = ".adk/performance_reports";
/// Default side-channel translation model
pub const DEFAULT_TRANSLATION_MODEL: &str = "gemini-2.5-flash-lite";
/// Default translation target language
pub const DEFAULT_TARGET_LANGUAGE: &str = "Brazilian Portuguese";

/// Variable lookup; the process environment outside of tests
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Trimmed value, `None` when unset or blank
fn env_string(env: EnvLookup<'_>, name: &str) -> Option<String> {
    env(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `true` (any case) enables, any other non-blank value disables
fn env_flag(env: EnvLookup<'_>, name: &str) -> Option<bool> {
    env_string(env, name).map(|v| v.eq_ignore_ascii_case("true"))
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Sections
// ============================================================================

/// Identity of the agent process, copied onto every report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Public base URL of the agent
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_app_name() -> String {
    DEFAULT_APP_NAME.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            base_url: default_base_url(),
        }
    }
}

impl AgentConfig {
    /// Read `AGENT_APP_NAME` / `AGENT_BASE_URL`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_from(&process_env);
        config
    }

    /// Overlay the variables that are set
    pub fn apply_env_from(&mut self, env: EnvLookup<'_>) {
        if let Some(v) = env_string(env, ENV_AGENT_APP_NAME) {
            self.app_name = v;
        }
        if let Some(v) = env_string(env, ENV_AGENT_BASE_URL) {
            self.base_url = v;
        }
    }
}

/// BigQuery target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BigQueryConfig {
    /// Project id
    #[serde(default)]
    pub project_id: Option<String>,
    /// Dataset id
    #[serde(default)]
    pub dataset_id: Option<String>,
    /// Table id
    #[serde(default)]
    pub table_id: Option<String>,
    /// OAuth bearer token; requests go out unauthenticated without it
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    /// REST base URL
    #[serde(default = "default_bq_base_url")]
    pub base_url: String,
}

fn default_bq_base_url() -> String {
    DEFAULT_BQ_BASE_URL.to_string()
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset_id: None,
            table_id: None,
            access_token: None,
            base_url: default_bq_base_url(),
        }
    }
}

impl BigQueryConfig {
    /// Fully qualified `project.dataset.table`, `None` unless all three are set
    #[must_use]
    pub fn table_ref(&self) -> Option<String> {
        match (&self.project_id, &self.dataset_id, &self.table_id) {
            (Some(p), Some(d), Some(t)) if !p.is_empty() && !d.is_empty() && !t.is_empty() => {
                Some(format!("{p}.{d}.{t}"))
            }
            _ => None,
        }
    }
}

/// Persistence backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Provider kind (`bigquery`, `sqlite`); empty disables persistence
    #[serde(default)]
    pub provider: String,
    /// BigQuery settings
    #[serde(default)]
    pub bigquery: BigQueryConfig,
    /// SQLite database file
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,
    /// Turn-end persistence bound in seconds
    #[serde(default = "default_persist_timeout")]
    pub timeout_secs: u64,
}

fn default_persist_timeout() -> u64 {
    DEFAULT_PERSIST_TIMEOUT_SECS
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            bigquery: BigQueryConfig::default(),
            sqlite_path: None,
            timeout_secs: default_persist_timeout(),
        }
    }
}

impl PersistenceConfig {
    /// Read the `FINOPS_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_from(&process_env);
        config
    }

    /// Overlay the `FINOPS_*` variables that are set.
    ///
    /// A timeout that is not a positive integer is ignored.
    pub fn apply_env_from(&mut self, env: EnvLookup<'_>) {
        if let Some(v) = env_string(env, ENV_PROVIDER_TYPE) {
            self.provider = v.to_lowercase();
        }
        if let Some(v) = env_string(env, ENV_BQ_PROJECT_ID) {
            self.bigquery.project_id = Some(v);
        }
        if let Some(v) = env_string(env, ENV_BQ_DATASET_ID) {
            self.bigquery.dataset_id = Some(v);
        }
        if let Some(v) = env_string(env, ENV_BQ_TABLE_ID) {
            self.bigquery.table_id = Some(v);
        }
        if let Some(v) = env_string(env, ENV_BQ_ACCESS_TOKEN) {
            self.bigquery.access_token = Some(v);
        }
        if let Some(v) = env_string(env, ENV_BQ_BASE_URL) {
            self.bigquery.base_url = v;
        }
        if let Some(v) = env_string(env, ENV_SQLITE_PATH) {
            self.sqlite_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env_string(env, ENV_PERSIST_TIMEOUT_SECS) {
            match v.parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => warn!(
                    variable = ENV_PERSIST_TIMEOUT_SECS,
                    value = %v,
                    "Ignoring invalid persistence timeout"
                ),
            }
        }
    }

    /// Turn-end persistence bound; zero falls back to the default
    #[must_use]
    pub fn persist_timeout(&self) -> Duration {
        let secs = if self.timeout_secs == 0 {
            DEFAULT_PERSIST_TIMEOUT_SECS
        } else {
            self.timeout_secs
        };
        Duration::from_secs(secs)
    }
}

/// Turn-end performance report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReportConfig {
    /// Generate the report at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Emit the report through `tracing` at info level
    #[serde(default = "default_true")]
    pub log: bool,
    /// Write the report to `dir`
    #[serde(default)]
    pub save: bool,
    /// Output directory for report files
    #[serde(default = "default_report_dir")]
    pub dir: PathBuf,
}

fn default_report_dir() -> PathBuf {
    PathBuf::from(DEFAULT_REPORT_DIR)
}

impl Default for PerformanceReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log: true,
            save: false,
            dir: default_report_dir(),
        }
    }
}

impl PerformanceReportConfig {
    /// Read the `PERFORMANCE_REPORT_*` variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_from(&process_env);
        config
    }

    /// Overlay the `PERFORMANCE_REPORT_*` variables that are set
    pub fn apply_env_from(&mut self, env: EnvLookup<'_>) {
        if let Some(v) = env_flag(env, ENV_REPORT_ENABLED) {
            self.enabled = v;
        }
        if let Some(v) = env_flag(env, ENV_REPORT_LOG) {
            self.log = v;
        }
        if let Some(v) = env_flag(env, ENV_REPORT_SAVE) {
            self.save = v;
        }
        if let Some(v) = env_string(env, ENV_REPORT_DIR) {
            self.dir = PathBuf::from(v);
        }
    }
}

/// Thought translation side channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Model used for the auxiliary call
    #[serde(default = "default_translation_model")]
    pub model: String,
    /// Language named in the translation prompt
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

fn default_translation_model() -> String {
    DEFAULT_TRANSLATION_MODEL.to_string()
}

fn default_target_language() -> String {
    DEFAULT_TARGET_LANGUAGE.to_string()
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            model: default_translation_model(),
            target_language: default_target_language(),
        }
    }
}

impl TranslationConfig {
    /// Read `TRANSLATION_MODEL`
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_from(&process_env);
        config
    }

    /// Overlay `TRANSLATION_MODEL` when set
    pub fn apply_env_from(&mut self, env: EnvLookup<'_>) {
        if let Some(v) = env_string(env, ENV_TRANSLATION_MODEL) {
            self.model = v;
        }
    }
}

/// Complete configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Agent identity
    #[serde(default)]
    pub agent: AgentConfig,
    /// Persistence backend
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Performance report
    #[serde(default)]
    pub performance: PerformanceReportConfig,
    /// Translation side channel
    #[serde(default)]
    pub translation: TranslationConfig,
}

impl TollgateConfig {
    /// Read every section from the environment
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay every documented variable set in the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(&process_env);
    }

    /// Overlay every documented variable `env` knows about
    pub fn apply_env_from(&mut self, env: EnvLookup<'_>) {
        self.agent.apply_env_from(env);
        self.persistence.apply_env_from(env);
        self.performance.apply_env_from(env);
        self.translation.apply_env_from(env);
    }
}
