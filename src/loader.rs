//! Configuration loading
//!
//! Embedded defaults, then optional files, then `TOLLGATE_*` variables. The
//! documented agent variables (`FINOPS_*`, `AGENT_*`, `PERFORMANCE_REPORT_*`,
//! `TRANSLATION_MODEL`) are applied last and win over every layer.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use tollgate_core::TollgateConfig;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Load configuration from files and environment
pub fn load_config() -> Result<TollgateConfig> {
    let mut config = load_layers()?;
    config.apply_env();
    Ok(config)
}

fn load_layers() -> Result<TollgateConfig> {
    let config = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            File::with_name(&format!(
                "config/{}",
                std::env::var("TOLLGATE_ENV").unwrap_or_else(|_| "development".to_string())
            ))
            .required(false),
        )
        .add_source(File::with_name("config/local").required(false))
        // config 0.14 defaults the prefix separator to `separator`, which would
        // require TOLLGATE__PERSISTENCE__PROVIDER instead of TOLLGATE_PERSISTENCE__PROVIDER.
        .add_source(
            Environment::with_prefix("TOLLGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}
