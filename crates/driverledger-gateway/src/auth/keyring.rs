//! Signing keys.

use std::fmt;

use driverledger_core::AuthConfig;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};

use super::AuthError;

/// One HMAC signing secret, identified in logs by its label.
#[derive(Clone)]
pub struct SigningKey {
    label: String,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    fn new(label: String, secret: &SecretString) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        Self {
            label,
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        }
    }

    /// Log label (`primary`, `alternate-1`, ...).
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) const fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) const fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Ordered signing secrets: the primary first, then alternates in
/// configuration order. Immutable once built.
#[derive(Debug, Clone)]
pub struct KeyRing {
    keys: Vec<SigningKey>,
}

impl KeyRing {
    /// Build a key ring.
    ///
    /// Alternates are trimmed; blank entries, duplicates and copies of the
    /// primary are dropped.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the primary secret is blank.
    pub fn new(
        primary: &SecretString,
        alternates: impl IntoIterator<Item = SecretString>,
    ) -> Result<Self, AuthError> {
        let primary_text = primary.expose_secret();
        if primary_text.trim().is_empty() {
            return Err(AuthError::Config("primary JWT secret is empty".to_string()));
        }

        let mut seen: Vec<SecretString> = Vec::new();
        for alternate in alternates {
            let trimmed = alternate.expose_secret().trim();
            if trimmed.is_empty()
                || trimmed == primary_text
                || seen.iter().any(|s| s.expose_secret() == trimmed)
            {
                continue;
            }
            seen.push(SecretString::from(trimmed.to_string()));
        }

        let mut keys = Vec::with_capacity(seen.len() + 1);
        keys.push(SigningKey::new("primary".to_string(), primary));
        for (i, secret) in seen.iter().enumerate() {
            keys.push(SigningKey::new(format!("alternate-{}", i + 1), secret));
        }

        Ok(Self { keys })
    }

    /// Build a key ring from configuration. Without a configured primary a
    /// random one is generated, so tokens do not survive a restart.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the configured primary is blank.
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let alternates = config
            .alternate_secrets
            .iter()
            .map(|s| SecretString::from(s.clone()));

        let primary = if let Some(secret) = &config.jwt_secret {
            SecretString::from(secret.clone())
        } else {
            tracing::warn!("No JWT secret configured; generated an ephemeral one, sessions will not survive restart");
            SecretString::from(Self::generate_secret())
        };

        let ring = Self::new(&primary, alternates)?;
        tracing::debug!(keys = ring.keys.len(), "key ring ready");
        Ok(ring)
    }

    /// Generate a random 256-bit secret as hex.
    #[must_use]
    pub fn generate_secret() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// The key new tokens are signed with.
    #[must_use]
    pub fn primary(&self) -> &SigningKey {
        &self.keys[0]
    }

    /// Verification candidates, primary first.
    #[must_use]
    pub fn candidates(&self) -> &[SigningKey] {
        &self.keys
    }
}
