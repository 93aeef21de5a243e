//! Token issuance and verification.
//!
//! Tokens are HS256 JWTs. New tokens are always signed with the key ring's
//! primary key; verification walks every candidate key in order and stops at
//! the first one that accepts the token.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use driverledger_core::AuthConfig;

use super::AuthError;
use super::keyring::KeyRing;
use super::registry::RefreshRegistry;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Token type. Absent on tokens minted by older deployments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,
    /// Unique token id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Token type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Access token for API calls.
    Access,
    /// Refresh token for getting new access tokens.
    Refresh,
}

/// Whether verification checks the `exp` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Reject expired tokens.
    Enforce,
    /// Accept expired tokens whose signature is valid.
    Ignore,
}

/// A signed token and its expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    /// Encoded token.
    pub token: String,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
}

/// A pair of access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Access token expiration.
    pub expires_at: DateTime<Utc>,
    /// Refresh token expiration.
    pub refresh_expires_at: DateTime<Utc>,
}

/// Creates signed tokens and records refresh tokens in the registry.
pub struct TokenIssuer {
    keys: Arc<KeyRing>,
    registry: Arc<dyn RefreshRegistry>,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
}

impl TokenIssuer {
    /// Create an issuer.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a lifetime is too large to represent.
    pub fn new(
        keys: Arc<KeyRing>,
        registry: Arc<dyn RefreshRegistry>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Result<Self, AuthError> {
        let lifetime = |ttl: Duration, name: &str| {
            chrono::Duration::from_std(ttl)
                .map_err(|e| AuthError::Config(format!("{name} token lifetime out of range: {e}")))
        };

        Ok(Self {
            keys,
            registry,
            access_ttl: lifetime(access_ttl, "Access")?,
            refresh_ttl: lifetime(refresh_ttl, "Refresh")?,
        })
    }

    /// Create an issuer with lifetimes from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if a configured lifetime is too large to represent.
    pub fn from_config(
        keys: Arc<KeyRing>,
        registry: Arc<dyn RefreshRegistry>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        Self::new(
            keys,
            registry,
            config.access_token_ttl(),
            config.refresh_token_ttl(),
        )
    }

    /// Issue an access token with the configured lifetime.
    ///
    /// # Errors
    ///
    /// Returns error if the expiry overflows or token encoding fails.
    pub fn issue_access_token(&self, subject: &str) -> Result<IssuedToken, AuthError> {
        self.issue_access_token_with_ttl(subject, self.access_ttl)
    }

    /// Issue an access token with an explicit lifetime. A negative lifetime
    /// yields an already expired token.
    ///
    /// # Errors
    ///
    /// Returns error if the expiry overflows or token encoding fails.
    pub fn issue_access_token_with_ttl(
        &self,
        subject: &str,
        ttl: chrono::Duration,
    ) -> Result<IssuedToken, AuthError> {
        self.sign(subject, ttl, TokenType::Access)
    }

    /// Issue a refresh token and make it the live one for `subject`.
    ///
    /// # Errors
    ///
    /// Returns error if encoding or the registry fails.
    pub async fn issue_refresh_token(&self, subject: &str) -> Result<IssuedToken, AuthError> {
        let issued = self.sign(subject, self.refresh_ttl, TokenType::Refresh)?;
        self.registry.set(subject, issued.token.clone()).await?;
        Ok(issued)
    }

    /// Issue an access and refresh token.
    ///
    /// # Errors
    ///
    /// Returns error if token creation fails.
    pub async fn issue_pair(&self, subject: &str) -> Result<TokenPair, AuthError> {
        let access = self.issue_access_token(subject)?;
        let refresh = self.issue_refresh_token(subject).await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_at: access.expires_at,
            refresh_expires_at: refresh.expires_at,
        })
    }

    /// The refresh-token registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn RefreshRegistry> {
        &self.registry
    }

    fn sign(
        &self,
        subject: &str,
        ttl: chrono::Duration,
        token_type: TokenType,
    ) -> Result<IssuedToken, AuthError> {
        let now = Utc::now();
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| AuthError::Token(format!("Token lifetime overflows: {ttl}")))?;

        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);

        let claims = Claims {
            sub: Some(subject.to_string()),
            exp: expires_at.timestamp(),
            iat: Some(now.timestamp()),
            token_type: Some(token_type),
            jti: Some(hex::encode(nonce)),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            self.keys.primary().encoding(),
        )
        .map_err(|e| AuthError::Token(format!("Encoding failed: {e}")))?;

        Ok(IssuedToken { token, expires_at })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

/// A verified token and the key that accepted it.
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    /// Decoded claims.
    pub claims: Claims,
    /// Label of the accepting key.
    pub key: String,
}

/// Result of decoding a token against one key, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct KeyProbe {
    /// Key label.
    pub key: String,
    /// Whether the signature is valid under this key.
    pub valid: bool,
    /// Decoded payload when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Whether `exp` is in the past.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
    /// Seconds until `exp`, negative once expired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds_remaining: Option<i64>,
    /// Decode error when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Verifies tokens against every key in a key ring.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    keys: Arc<KeyRing>,
}

impl TokenVerifier {
    /// Create a verifier.
    #[must_use]
    pub const fn new(keys: Arc<KeyRing>) -> Self {
        Self { keys }
    }

    /// Verify a token, trying each key in order and returning on the first
    /// that accepts it.
    ///
    /// When no key accepts the token, the result is `ExpiredSignature` if any
    /// key rejected it only for being expired, else `InvalidSignature` with
    /// the last error seen.
    ///
    /// # Errors
    ///
    /// Returns `ExpiredSignature` or `InvalidSignature`.
    pub fn verify(&self, token: &str, policy: ExpiryPolicy) -> Result<VerifiedToken, AuthError> {
        let result = self.try_candidates(token, policy);
        if let Err(AuthError::InvalidSignature(_)) = &result {
            tracing::warn!(?policy, keys = self.keys.candidates().len(), "token rejected by all keys");
        }
        result
    }

    /// Same as [`verify`](Self::verify) but logs rejections at debug level,
    /// for checks that never gate a request.
    ///
    /// # Errors
    ///
    /// Returns `ExpiredSignature` or `InvalidSignature`.
    pub fn peek(&self, token: &str, policy: ExpiryPolicy) -> Result<VerifiedToken, AuthError> {
        let result = self.try_candidates(token, policy);
        if let Err(e) = &result {
            tracing::debug!(?policy, error = %e, "token not readable");
        }
        result
    }

    fn try_candidates(&self, token: &str, policy: ExpiryPolicy) -> Result<VerifiedToken, AuthError> {
        let validation = validation(policy);
        let mut expired: Option<String> = None;
        let mut last_error: Option<String> = None;

        for key in self.keys.candidates() {
            match decode::<Claims>(token, key.decoding(), &validation) {
                Ok(data) => {
                    if key.label() != self.keys.primary().label() {
                        tracing::info!(key = key.label(), "token accepted by alternate key");
                    }
                    return Ok(VerifiedToken {
                        claims: data.claims,
                        key: key.label().to_string(),
                    });
                }
                Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                    tracing::debug!(key = key.label(), "token expired under key");
                    expired = Some(e.to_string());
                }
                Err(e) => {
                    tracing::debug!(key = key.label(), error = %e, "token rejected by key");
                    last_error = Some(e.to_string());
                }
            }
        }

        if let Some(detail) = expired {
            tracing::debug!(?policy, "token expired under every accepting key");
            return Err(AuthError::ExpiredSignature(detail));
        }

        Err(AuthError::InvalidSignature(
            last_error.unwrap_or_else(|| "no signing keys".to_string()),
        ))
    }

    /// Decode a token against every key, ignoring expiry, and report each
    /// outcome.
    #[must_use]
    pub fn inspect(&self, token: &str) -> Vec<KeyProbe> {
        let mut validation = validation(ExpiryPolicy::Ignore);
        validation.required_spec_claims.clear();
        let now = Utc::now().timestamp();

        self.keys
            .candidates()
            .iter()
            .map(|key| match decode::<serde_json::Value>(token, key.decoding(), &validation) {
                Ok(data) => {
                    let exp = data.claims.get("exp").and_then(serde_json::Value::as_i64);
                    KeyProbe {
                        key: key.label().to_string(),
                        valid: true,
                        is_expired: exp.map(|exp| exp < now),
                        seconds_remaining: exp.map(|exp| exp - now),
                        payload: Some(data.claims),
                        error: None,
                    }
                }
                Err(e) => KeyProbe {
                    key: key.label().to_string(),
                    valid: false,
                    payload: None,
                    is_expired: None,
                    seconds_remaining: None,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }
}

fn validation(policy: ExpiryPolicy) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;
    validation.validate_exp = policy == ExpiryPolicy::Enforce;
    validation.leeway = 0;
    validation
}

/// Extract the token from an Authorization header value.
///
/// Expects format: "Bearer <token>"
#[must_use]
pub fn extract_from_header(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
