//! Config command - locate, show and validate configuration.

use std::path::PathBuf;

use anyhow::Result;
use driverledger_core::Config;

use super::load_config;
use crate::ui;

const REDACTED: &str = "********";

/// Config command arguments.
#[derive(Debug, Clone)]
pub struct ConfigArgs {
    /// Config file override.
    pub config_path: Option<PathBuf>,
    /// Subcommand.
    pub action: ConfigAction,
}

/// Config actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Print the effective config.
    Show,
    /// Validate the config.
    Validate,
}

/// Run the config command.
pub fn run_config(args: ConfigArgs) -> Result<()> {
    let path = args.config_path.clone().unwrap_or_else(Config::default_path);

    match args.action {
        ConfigAction::Path => {
            println!("{}", path.display());
            if !path.exists() {
                ui::info("File does not exist yet; defaults are in effect");
            }
        }
        ConfigAction::Show => {
            let config = redacted(load_config(args.config_path.as_deref())?);
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        ConfigAction::Validate => match load_config(args.config_path.as_deref()) {
            Ok(config) => {
                ui::success(&format!("Configuration is valid ({})", path.display()));
                ui::kv("Port", &config.server.port.to_string());
                ui::kv(
                    "Alternate secrets",
                    &config.auth.alternate_secrets.len().to_string(),
                );
            }
            Err(e) => {
                ui::error(&format!("{e:#}"));
                return Err(e);
            }
        },
    }
    Ok(())
}

/// Replace every secret with a placeholder.
fn redacted(mut config: Config) -> Config {
    if config.auth.jwt_secret.is_some() {
        config.auth.jwt_secret = Some(REDACTED.to_string());
    }
    for secret in &mut config.auth.alternate_secrets {
        *secret = REDACTED.to_string();
    }
    config
}
