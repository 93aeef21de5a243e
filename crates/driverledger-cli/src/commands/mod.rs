//! CLI command implementations.

pub mod config;
pub mod serve;
pub mod token;

pub use config::run_config;
pub use serve::run_serve;
pub use token::run_token;

use std::path::Path;

use anyhow::{Context, Result};
use driverledger_core::Config;

/// Load the config file (or defaults when it is missing), apply
/// environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default().context("Failed to load config")?,
    };

    let config = config.with_env_overrides();
    config.validate().context("Invalid configuration")?;
    tracing::debug!(port = config.server.port, "configuration loaded");
    Ok(config)
}
