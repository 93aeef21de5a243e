//! Password hashing.

use argon2::Argon2;
use argon2::password_hash::{
    PasswordHash, PasswordHasher, PasswordVerifier as _, SaltString, rand_core::OsRng,
};

use super::AuthError;

/// Salted Argon2id password hashing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordVerifier;

impl PasswordVerifier {
    /// Create a verifier with default Argon2 parameters.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Hash a plaintext password.
    ///
    /// # Errors
    ///
    /// Returns `Hash` if Argon2 cannot produce a hash.
    pub fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| AuthError::Hash(e.to_string()))
    }

    /// Check a plaintext password against a stored hash. A malformed hash
    /// never matches.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            tracing::debug!("stored password hash is malformed");
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}
