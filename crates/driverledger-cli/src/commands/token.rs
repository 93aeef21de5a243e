//! Token command - inspect and mint tokens with the configured keys.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use driverledger_core::AuthConfig;
use driverledger_gateway::auth::{InMemoryRefreshRegistry, KeyRing, TokenIssuer, TokenVerifier};

use super::load_config;
use crate::ui;

/// Token command arguments.
#[derive(Debug, Clone)]
pub struct TokenArgs {
    /// Config file override.
    pub config_path: Option<PathBuf>,
    /// Subcommand.
    pub action: TokenAction,
}

/// Token actions.
#[derive(Debug, Clone)]
pub enum TokenAction {
    /// Decode against every key.
    Inspect {
        /// Encoded token.
        token: String,
    },
    /// Sign a new access token.
    Mint {
        /// Subject.
        subject: String,
        /// Lifetime in minutes.
        minutes: Option<i64>,
    },
}

/// Run the token command.
pub fn run_token(args: TokenArgs) -> Result<()> {
    let config = load_config(args.config_path.as_deref())?;
    let keys = Arc::new(configured_keys(&config.auth)?);

    match args.action {
        TokenAction::Inspect { token } => {
            let probes = TokenVerifier::new(keys).inspect(token.trim());
            if !probes.iter().any(|p| p.valid) {
                ui::warning("Token does not verify under any configured key");
            }
            println!("{}", serde_json::to_string_pretty(&probes)?);
        }
        TokenAction::Mint { subject, minutes } => {
            let minutes = match minutes {
                Some(minutes) => minutes,
                None => i64::try_from(config.auth.access_token_minutes)
                    .context("Access token lifetime is too large")?,
            };
            let ttl = mint_lifetime(minutes)?;
            let issuer = TokenIssuer::from_config(
                keys,
                Arc::new(InMemoryRefreshRegistry::new()),
                &config.auth,
            )
            .context("Invalid token lifetimes")?;
            let issued = issuer
                .issue_access_token_with_ttl(&subject, ttl)
                .context("Failed to sign token")?;

            ui::kv("Expires", &issued.expires_at.to_rfc3339());
            println!("{}", issued.token);
        }
    }
    Ok(())
}

fn mint_lifetime(minutes: i64) -> Result<chrono::Duration> {
    chrono::Duration::try_minutes(minutes)
        .with_context(|| format!("Token lifetime of {minutes} minutes is out of range"))
}

/// Key ring for diagnostics. A generated secret would make every result
/// meaningless, so a configured primary is required.
fn configured_keys(auth: &AuthConfig) -> Result<KeyRing> {
    if auth.jwt_secret.is_none() {
        bail!("No JWT secret configured; set auth.jwtSecret or JWT_SECRET_KEY");
    }
    KeyRing::from_config(auth).context("Invalid signing keys")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_configured_secret() {
        assert!(configured_keys(&AuthConfig::default()).is_err());

        let auth = AuthConfig::builder()
            .jwt_secret("primary")
            .alternate_secret("legacy")
            .build();
        let keys = configured_keys(&auth).unwrap();
        assert_eq!(keys.candidates().len(), 2);
    }

    #[test]
    fn test_mint_lifetime_range() {
        assert_eq!(mint_lifetime(-5).unwrap(), chrono::Duration::minutes(-5));
        assert!(mint_lifetime(i64::MAX).is_err());
    }
}
