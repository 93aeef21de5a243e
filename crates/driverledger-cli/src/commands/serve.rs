//! Serve command - start the HTTP server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use driverledger_gateway::GatewayConfig;

use super::load_config;
use crate::ui;

/// Serve command arguments.
#[derive(Debug, Clone, Default)]
pub struct ServeArgs {
    /// Config file override.
    pub config_path: Option<PathBuf>,
    /// Port override.
    pub port: Option<u16>,
    /// Bind address override.
    pub bind: Option<String>,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Start the server and run until it stops.
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = load_config(args.config_path.as_deref())?;

    let mut gateway_config = GatewayConfig::from(&config);
    if let Some(port) = args.port {
        gateway_config.port = port;
    }
    if let Some(bind) = args.bind {
        gateway_config.bind_address = bind;
    }
    if let Some(data_dir) = args.data_dir {
        gateway_config.data_dir = data_dir;
    }

    ui::header("Starting DriverLedger");
    ui::kv(
        "Address",
        &format!("{}:{}", gateway_config.bind_address, gateway_config.port),
    );
    ui::kv("Data", &gateway_config.data_dir.display().to_string());
    ui::kv(
        "Signing keys",
        &(1 + gateway_config.auth.alternate_secrets.len()).to_string(),
    );
    if gateway_config.auth.jwt_secret.is_none() {
        ui::warning("No JWT secret configured; sessions will not survive a restart");
    }
    if gateway_config.auth.debug_endpoints {
        ui::warning("Token debug endpoint is enabled");
    }
    println!();

    ui::info("Press Ctrl+C to stop");
    driverledger_gateway::start(gateway_config)
        .await
        .context("Gateway stopped with an error")?;

    Ok(())
}
