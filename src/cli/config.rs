//! `tollgate config`
//!
//! Prints the configuration after every layer has been applied. Secrets are
//! never serialized.

use crate::loader::{load_config, DEFAULT_CONFIG};
use anyhow::{Context, Result};

pub fn run(defaults: bool) -> Result<()> {
    if defaults {
        print!("{DEFAULT_CONFIG}");
        return Ok(());
    }

    let config = load_config().context("Failed to load configuration")?;
    let rendered =
        serde_json::to_string_pretty(&config).context("Failed to serialize configuration")?;
    println!("{rendered}");

    if config.persistence.provider.is_empty() {
        println!();
        println!("Persistence is disabled. Set TOLLGATE_PERSISTENCE__PROVIDER to enable it.");
    }
    Ok(())
}
