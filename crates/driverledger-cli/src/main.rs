//! DriverLedger CLI - Command-line interface for DriverLedger.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "driverledger")]
#[command(about = "DriverLedger - driver expense tracking backend")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Config file (defaults to the state directory)
    #[arg(long, global = true, env = "DRIVERLEDGER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Data directory for the document store
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Token diagnostics
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Decode a token against every configured key
    Inspect {
        /// Encoded token
        token: String,
    },

    /// Sign an access token with the primary key
    Mint {
        /// Token subject (username)
        subject: String,

        /// Lifetime in minutes (defaults to the configured access lifetime)
        #[arg(long, allow_negative_numbers = true)]
        minutes: Option<i64>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the config file location
    Path,

    /// Show the effective configuration with secrets redacted
    Show,

    /// Validate configuration
    Validate,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config_path = cli.config;

    match cli.command {
        Commands::Serve {
            port,
            bind,
            data_dir,
        } => {
            let args = commands::serve::ServeArgs {
                config_path,
                port,
                bind,
                data_dir,
            };
            commands::run_serve(args).await?;
        }

        Commands::Token { action } => {
            let action = match action {
                TokenCommands::Inspect { token } => commands::token::TokenAction::Inspect { token },
                TokenCommands::Mint { subject, minutes } => {
                    commands::token::TokenAction::Mint { subject, minutes }
                }
            };
            commands::run_token(commands::token::TokenArgs {
                config_path,
                action,
            })?;
        }

        Commands::Config { action } => {
            let action = match action {
                Some(ConfigCommands::Path) => commands::config::ConfigAction::Path,
                Some(ConfigCommands::Validate) => commands::config::ConfigAction::Validate,
                Some(ConfigCommands::Show) | None => commands::config::ConfigAction::Show,
            };
            commands::run_config(commands::config::ConfigArgs {
                config_path,
                action,
            })?;
        }
    }
    Ok(())
}
