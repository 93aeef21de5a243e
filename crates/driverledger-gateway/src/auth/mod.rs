//! Authentication for the gateway.
//!
//! This module provides:
//! - A key ring of signing secrets (primary plus legacy alternates)
//! - Password hashing and verification
//! - Token issuance with a refresh-token registry
//! - Token verification with ordered key fallback
//! - Strict and lenient request gates
//! - The user directory

mod gate;
mod jwt;
mod keyring;
mod middleware;
mod password;
mod registry;
mod users;

pub use gate::{AuthenticationGate, VerifiedIdentity};
pub use jwt::{
    Claims, ExpiryPolicy, IssuedToken, KeyProbe, TokenIssuer, TokenPair, TokenType,
    TokenVerifier, VerifiedToken, extract_from_header,
};
pub use keyring::{KeyRing, SigningKey};
pub use middleware::{
    AllowExpiredUser, AuthState, RequireUser, TOKEN_EXPIRED_HEADER, TOKEN_EXPIRING_SOON_HEADER,
    expiry_notice,
};
pub use password::PasswordVerifier;
pub use registry::{InMemoryRefreshRegistry, RefreshRegistry};
pub use users::{NewUser, ProfileUpdate, PublicUser, User, UserDirectory};

use driverledger_core::StorageError;
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No bearer token in the Authorization header.
    #[error("Not authenticated")]
    MissingCredentials,

    /// Token malformed or signed by an unknown key.
    #[error("Invalid token: {0}")]
    InvalidSignature(String),

    /// Token signature is valid but it has expired.
    #[error("Token expired: {0}")]
    ExpiredSignature(String),

    /// Token carries no subject.
    #[error("Token has no subject")]
    MissingSubject,

    /// Token subject does not match any user.
    #[error("Unknown user: {0}")]
    UnknownSubject(String),

    /// A refresh token was presented where an access token is required.
    #[error("Refresh tokens cannot be used for API access")]
    WrongTokenType,

    /// Refresh token is not the live one for its subject.
    #[error("Refresh token has been superseded")]
    RefreshRejected,

    /// Username already registered.
    #[error("Username already registered: {0}")]
    DuplicateUsername(String),

    /// Bad username or password.
    #[error("Incorrect username or password")]
    AuthenticationFailed,

    /// Token encoding failed.
    #[error("Token error: {0}")]
    Token(String),

    /// Password hashing failed.
    #[error("Password hashing failed: {0}")]
    Hash(String),

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),
}

impl AuthError {
    /// Whether this is an authentication failure (HTTP 401).
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials
                | Self::InvalidSignature(_)
                | Self::ExpiredSignature(_)
                | Self::MissingSubject
                | Self::UnknownSubject(_)
                | Self::WrongTokenType
                | Self::RefreshRejected
                | Self::AuthenticationFailed
        )
    }
}

impl From<StorageError> for AuthError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e.to_string())
    }
}
