//! Configuration loading and validation.
//!
//! Config is JSON5. Location: `~/.driverledger/driverledger.json`, or
//! `$DRIVERLEDGER_STATE_DIR/driverledger.json` when that variable is set.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default access token lifetime in minutes.
const DEFAULT_ACCESS_TOKEN_MINUTES: u64 = 30;
/// Default refresh token lifetime in days.
const DEFAULT_REFRESH_TOKEN_DAYS: u64 = 7;
/// Default window for the "expiring soon" response header, in minutes.
const DEFAULT_EXPIRY_NOTICE_MINUTES: u64 = 5;
/// Longest accepted access token lifetime (one week).
pub const MAX_ACCESS_TOKEN_MINUTES: u64 = 7 * 24 * 60;
/// Longest accepted refresh token lifetime (one year).
pub const MAX_REFRESH_TOKEN_DAYS: u64 = 365;

/// Seconds in `count` units of `unit_secs`, saturating at `Duration::MAX`.
const fn seconds(count: u64, unit_secs: u64) -> Duration {
    match count.checked_mul(unit_secs) {
        Some(secs) => Duration::from_secs(secs),
        None => Duration::MAX,
    }
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON5 parsing error.
    #[error("Parse error: {0}")]
    Parse(#[from] json5::Error),

    /// Config validation error.
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Document storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Authentication settings.
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if config exists but cannot be loaded or parsed.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a path.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config file path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        Self::state_dir().join("driverledger.json")
    }

    /// Get the state directory.
    ///
    /// Uses `DRIVERLEDGER_STATE_DIR` env var if set, otherwise `~/.driverledger`.
    #[must_use]
    pub fn state_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("DRIVERLEDGER_STATE_DIR") {
            PathBuf::from(dir)
        } else if let Some(home) = dirs::home_dir() {
            home.join(".driverledger")
        } else {
            PathBuf::from(".driverledger")
        }
    }

    /// Apply environment overrides to every section that supports them.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.auth = self.auth.with_env_overrides();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "Server port cannot be 0".to_string(),
            ));
        }

        self.auth.validate()
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Address to bind.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            cors: true,
        }
    }
}

const fn default_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

const fn default_true() -> bool {
    true
}

/// Document storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Directory holding the document database.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the data directory, defaulting to `<state dir>/data`.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| Config::state_dir().join("data"))
    }
}

/// Authentication configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Primary JWT signing secret. Generated at startup if unset.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Retired or alternate secrets still accepted for verification, in order.
    #[serde(default)]
    pub alternate_secrets: Vec<String>,

    /// Access token lifetime in minutes.
    #[serde(default = "default_access_token_minutes")]
    pub access_token_minutes: u64,

    /// Refresh token lifetime in days.
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: u64,

    /// Flag responses whose token expires within this many minutes.
    #[serde(default = "default_expiry_notice_minutes")]
    pub expiry_notice_minutes: u64,

    /// Expose `/api/debug/token-info`.
    #[serde(default)]
    pub debug_endpoints: bool,
}

const fn default_access_token_minutes() -> u64 {
    DEFAULT_ACCESS_TOKEN_MINUTES
}

const fn default_refresh_token_days() -> u64 {
    DEFAULT_REFRESH_TOKEN_DAYS
}

const fn default_expiry_notice_minutes() -> u64 {
    DEFAULT_EXPIRY_NOTICE_MINUTES
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            alternate_secrets: Vec::new(),
            access_token_minutes: default_access_token_minutes(),
            refresh_token_days: default_refresh_token_days(),
            expiry_notice_minutes: default_expiry_notice_minutes(),
            debug_endpoints: false,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "<redacted>"))
            .field("alternate_secrets", &self.alternate_secrets.len())
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_days", &self.refresh_token_days)
            .field("expiry_notice_minutes", &self.expiry_notice_minutes)
            .field("debug_endpoints", &self.debug_endpoints)
            .finish()
    }
}

impl AuthConfig {
    /// Create a new auth config builder.
    #[must_use]
    pub fn builder() -> AuthConfigBuilder {
        AuthConfigBuilder::default()
    }

    /// Access token lifetime.
    #[must_use]
    pub const fn access_token_ttl(&self) -> Duration {
        seconds(self.access_token_minutes, 60)
    }

    /// Refresh token lifetime.
    #[must_use]
    pub const fn refresh_token_ttl(&self) -> Duration {
        seconds(self.refresh_token_days, 24 * 3600)
    }

    /// Window for the expiring-soon notice.
    #[must_use]
    pub const fn expiry_notice_window(&self) -> Duration {
        seconds(self.expiry_notice_minutes, 60)
    }

    /// Load overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// `JWT_SECRET_KEY` and `ALTERNATE_JWT_SECRET_KEY` are the names older
    /// deployments used; they are honored alongside the prefixed ones.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(secret) = lookup("DRIVERLEDGER_JWT_SECRET").or_else(|| lookup("JWT_SECRET_KEY"))
        {
            self.jwt_secret = Some(secret);
        }

        if let Some(list) = lookup("DRIVERLEDGER_ALTERNATE_JWT_SECRETS") {
            self.alternate_secrets
                .extend(list.split(',').map(str::trim).map(String::from));
        }

        if let Some(secret) = lookup("ALTERNATE_JWT_SECRET_KEY") {
            self.alternate_secrets.push(secret);
        }

        if let Some(flag) = lookup("DRIVERLEDGER_DEBUG_ENDPOINTS") {
            self.debug_endpoints = flag == "1" || flag.eq_ignore_ascii_case("true");
        }

        self
    }

    /// Validate auth settings.
    ///
    /// # Errors
    ///
    /// Returns error for zero or out-of-range lifetimes, a notice window
    /// longer than the access token lifetime, or an explicitly blank primary
    /// secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token_minutes == 0 || self.refresh_token_days == 0 {
            return Err(ConfigError::Validation(
                "Token lifetimes must be greater than zero".to_string(),
            ));
        }

        if self.access_token_minutes > MAX_ACCESS_TOKEN_MINUTES {
            return Err(ConfigError::Validation(format!(
                "accessTokenMinutes must be at most {MAX_ACCESS_TOKEN_MINUTES}"
            )));
        }

        if self.refresh_token_days > MAX_REFRESH_TOKEN_DAYS {
            return Err(ConfigError::Validation(format!(
                "refreshTokenDays must be at most {MAX_REFRESH_TOKEN_DAYS}"
            )));
        }

        if self.expiry_notice_minutes > self.access_token_minutes {
            return Err(ConfigError::Validation(
                "expiryNoticeMinutes must not exceed accessTokenMinutes".to_string(),
            ));
        }

        if self
            .jwt_secret
            .as_deref()
            .is_some_and(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "jwtSecret is set but empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for `AuthConfig`.
#[derive(Debug, Default)]
pub struct AuthConfigBuilder {
    config: AuthConfig,
}

impl AuthConfigBuilder {
    /// Set the primary signing secret.
    #[must_use]
    pub fn jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt_secret = Some(secret.into());
        self
    }

    /// Append an alternate verification secret.
    #[must_use]
    pub fn alternate_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.alternate_secrets.push(secret.into());
        self
    }

    /// Set access token lifetime in minutes.
    #[must_use]
    pub const fn access_token_minutes(mut self, minutes: u64) -> Self {
        self.config.access_token_minutes = minutes;
        self
    }

    /// Set refresh token lifetime in days.
    #[must_use]
    pub const fn refresh_token_days(mut self, days: u64) -> Self {
        self.config.refresh_token_days = days;
        self
    }

    /// Set the expiring-soon window in minutes.
    #[must_use]
    pub const fn expiry_notice_minutes(mut self, minutes: u64) -> Self {
        self.config.expiry_notice_minutes = minutes;
        self
    }

    /// Enable or disable the token debug endpoint.
    #[must_use]
    pub const fn debug_endpoints(mut self, enabled: bool) -> Self {
        self.config.debug_endpoints = enabled;
        self
    }

    /// Build the config.
    #[must_use]
    pub fn build(self) -> AuthConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert!(config.server.cors);
        assert!(config.auth.jwt_secret.is_none());
        assert_eq!(config.auth.access_token_minutes, 30);
        assert_eq!(config.auth.refresh_token_days, 7);
        assert!(!config.auth.debug_endpoints);
    }

    #[test]
    fn test_durations() {
        let auth = AuthConfig::default();
        assert_eq!(auth.access_token_ttl(), Duration::from_secs(30 * 60));
        assert_eq!(auth.refresh_token_ttl(), Duration::from_secs(7 * 24 * 3600));
        assert_eq!(auth.expiry_notice_window(), Duration::from_secs(5 * 60));
    }

    #[test]
    fn test_parse_json5() {
        let config: Config = json5::from_str(
            r#"{
                // comments are fine
                server: { port: 9000 },
                auth: {
                    jwtSecret: "primary",
                    alternateSecrets: ["old-1", "old-2"],
                    accessTokenMinutes: 15,
                },
            }"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.auth.jwt_secret.as_deref(), Some("primary"));
        assert_eq!(config.auth.alternate_secrets, vec!["old-1", "old-2"]);
        assert_eq!(config.auth.access_token_minutes, 15);
        assert_eq!(config.auth.refresh_token_days, 7);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JWT_SECRET_KEY", "from-env"),
            ("DRIVERLEDGER_ALTERNATE_JWT_SECRETS", "a, b"),
            ("ALTERNATE_JWT_SECRET_KEY", "c"),
            ("DRIVERLEDGER_DEBUG_ENDPOINTS", "true"),
        ]);

        let auth = AuthConfig::builder()
            .alternate_secret("from-file")
            .build()
            .with_overrides_from(|name| vars.get(name).map(ToString::to_string));

        assert_eq!(auth.jwt_secret.as_deref(), Some("from-env"));
        assert_eq!(auth.alternate_secrets, vec!["from-file", "a", "b", "c"]);
        assert!(auth.debug_endpoints);
    }

    #[test]
    fn test_prefixed_secret_wins() {
        let auth = AuthConfig::default().with_overrides_from(|name| match name {
            "DRIVERLEDGER_JWT_SECRET" => Some("prefixed".to_string()),
            "JWT_SECRET_KEY" => Some("legacy".to_string()),
            _ => None,
        });
        assert_eq!(auth.jwt_secret.as_deref(), Some("prefixed"));
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.auth.jwt_secret = Some("   ".to_string());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));

        config.auth.jwt_secret = None;
        config.auth.access_token_minutes = 0;
        assert!(config.validate().is_err());

        config.auth.access_token_minutes = 30;
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_bounds_lifetimes() {
        let mut auth = AuthConfig::default();
        auth.access_token_minutes = u64::MAX / 120;
        assert!(matches!(auth.validate(), Err(ConfigError::Validation(_))));

        auth.access_token_minutes = MAX_ACCESS_TOKEN_MINUTES;
        assert!(auth.validate().is_ok());

        auth.refresh_token_days = MAX_REFRESH_TOKEN_DAYS + 1;
        assert!(auth.validate().is_err());

        auth.refresh_token_days = 7;
        auth.expiry_notice_minutes = MAX_ACCESS_TOKEN_MINUTES + 1;
        assert!(auth.validate().is_err());
    }

    #[test]
    fn test_durations_saturate() {
        let auth = AuthConfig::builder()
            .access_token_minutes(u64::MAX)
            .refresh_token_days(u64::MAX)
            .build();
        assert_eq!(auth.access_token_ttl(), Duration::MAX);
        assert_eq!(auth.refresh_token_ttl(), Duration::MAX);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = AuthConfig::builder()
            .jwt_secret("primary-secret")
            .alternate_secret("legacy-secret")
            .build();
        let shown = format!("{auth:?}");
        assert!(!shown.contains("primary-secret"));
        assert!(!shown.contains("legacy-secret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("driverledger.json");

        let mut config = Config::default();
        config.auth.jwt_secret = Some("saved".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.auth.jwt_secret.as_deref(), Some("saved"));
    }
}
