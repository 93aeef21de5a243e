//! Authentication state and axum integration.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{
        HeaderMap, HeaderName, HeaderValue, StatusCode,
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        request::Parts,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use driverledger_core::{AuthConfig, DocumentStore};
use serde::Serialize;

use super::AuthError;
use super::gate::{AuthenticationGate, VerifiedIdentity};
use super::jwt::{
    ExpiryPolicy, IssuedToken, TokenIssuer, TokenPair, TokenVerifier, extract_from_header,
};
use super::keyring::KeyRing;
use super::password::PasswordVerifier;
use super::registry::{InMemoryRefreshRegistry, RefreshRegistry};
use super::users::{NewUser, User, UserDirectory};

/// Marks a 401 caused by an expired token.
pub const TOKEN_EXPIRED_HEADER: &str = "x-token-expired";

/// Marks a response whose request token expires soon.
pub const TOKEN_EXPIRING_SOON_HEADER: &str = "x-token-expiring-soon";

/// Shared authentication state.
pub struct AuthState {
    /// Auth configuration.
    pub config: AuthConfig,
    /// Signing keys.
    pub keys: Arc<KeyRing>,
    /// Token issuer.
    pub issuer: TokenIssuer,
    /// Token verifier.
    pub verifier: TokenVerifier,
    /// Request gates.
    pub gate: AuthenticationGate,
    /// User directory.
    pub users: UserDirectory,
    /// Password hashing.
    pub passwords: PasswordVerifier,
}

impl AuthState {
    /// Create auth state with an explicit refresh registry.
    ///
    /// # Errors
    ///
    /// Returns error if the key ring or token issuer cannot be built.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn DocumentStore>,
        registry: Arc<dyn RefreshRegistry>,
    ) -> Result<Self, AuthError> {
        let keys = Arc::new(KeyRing::from_config(&config)?);
        let users = UserDirectory::new(store);
        let verifier = TokenVerifier::new(Arc::clone(&keys));
        let issuer = TokenIssuer::from_config(Arc::clone(&keys), registry, &config)?;
        let gate = AuthenticationGate::new(verifier.clone(), users.clone());

        Ok(Self {
            config,
            keys,
            issuer,
            verifier,
            gate,
            users,
            passwords: PasswordVerifier::new(),
        })
    }

    /// Create auth state with an in-memory refresh registry.
    ///
    /// # Errors
    ///
    /// Returns error if the key ring cannot be built.
    pub fn initialize(config: AuthConfig, store: Arc<dyn DocumentStore>) -> Result<Self, AuthError> {
        Self::new(config, store, Arc::new(InMemoryRefreshRegistry::new()))
    }

    /// Check credentials and issue a token pair.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationFailed` for an unknown user or wrong password.
    pub async fn login(&self, username: &str, password: &str) -> Result<(User, TokenPair), AuthError> {
        let Some(user) = self.users.find_by_username(username).await? else {
            tracing::info!(%username, "login for unknown user");
            return Err(AuthError::AuthenticationFailed);
        };

        if !self.passwords.verify(password, &user.password_hash) {
            tracing::info!(%username, "login with wrong password");
            return Err(AuthError::AuthenticationFailed);
        }

        let pair = self.issuer.issue_pair(&user.username).await?;
        tracing::info!(user = %user.id, %username, "login succeeded");
        Ok((user, pair))
    }

    /// Mint a new access token from the live refresh token.
    ///
    /// The refresh token must verify with expiry enforced and must be the
    /// one currently registered for its subject.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials`, `ExpiredSignature`, `InvalidSignature`,
    /// `MissingSubject` or `RefreshRejected`.
    pub async fn renew(&self, authorization: Option<&str>) -> Result<IssuedToken, AuthError> {
        let token = authorization
            .and_then(extract_from_header)
            .ok_or(AuthError::MissingCredentials)?;

        let verified = self.verifier.verify(token, ExpiryPolicy::Enforce)?;
        let subject = verified
            .claims
            .sub
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        let live = self.issuer.registry().get(&subject).await?;
        if live.as_deref() != Some(token) {
            tracing::info!(%subject, "refresh token rejected, not the live one");
            return Err(AuthError::RefreshRejected);
        }

        let issued = self.issuer.issue_access_token(&subject)?;
        tracing::debug!(%subject, "access token renewed");
        Ok(issued)
    }

    /// Register a new account.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateUsername` if the username is taken.
    pub async fn register(&self, new_user: NewUser) -> Result<User, AuthError> {
        let new_user = new_user.normalized();
        let hash = self.passwords.hash(&new_user.password)?;
        self.users
            .create(
                &new_user.username,
                hash,
                new_user.email,
                new_user.profile_picture,
            )
            .await
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("keys", &self.keys.candidates().len())
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Extractor for the strict gate.
#[derive(Debug, Clone)]
pub struct RequireUser(pub VerifiedIdentity);

/// Extractor for the lenient gate (expired tokens accepted).
#[derive(Debug, Clone)]
pub struct AllowExpiredUser(pub VerifiedIdentity);

fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok())
}

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthState>::from_ref(state);
        auth.gate
            .require_valid_user(authorization(&parts.headers))
            .await
            .map(Self)
    }
}

impl<S> FromRequestParts<S> for AllowExpiredUser
where
    S: Send + Sync,
    Arc<AuthState>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth = Arc::<AuthState>::from_ref(state);
        auth.gate
            .require_user_allow_expired(authorization(&parts.headers))
            .await
            .map(Self)
    }
}

/// Error response for auth failures.
#[derive(Debug, Serialize)]
struct AuthErrorResponse {
    detail: String,
    code: &'static str,
    token_expired: bool,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = match &self {
            Self::MissingCredentials => "not_authenticated",
            Self::InvalidSignature(_) => "invalid_token",
            Self::ExpiredSignature(_) => "token_expired",
            Self::MissingSubject => "missing_subject",
            Self::UnknownSubject(_) => "unknown_user",
            Self::WrongTokenType => "wrong_token_type",
            Self::RefreshRejected => "refresh_rejected",
            Self::AuthenticationFailed => "invalid_credentials",
            Self::DuplicateUsername(_) => "username_taken",
            Self::Token(_) | Self::Hash(_) | Self::Storage(_) | Self::Config(_) => "internal_error",
        };
        let status = if self.is_unauthorized() {
            StatusCode::UNAUTHORIZED
        } else if matches!(self, Self::DuplicateUsername(_)) {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let expired = matches!(self, Self::ExpiredSignature(_));
        let detail = match &self {
            Self::ExpiredSignature(_) => {
                "Token expired, renew it at /api/refresh-token".to_string()
            }
            Self::Token(_) | Self::Hash(_) | Self::Storage(_) | Self::Config(_) => {
                tracing::error!(error = %self, "authentication infrastructure failure");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = AuthErrorResponse {
            detail,
            code,
            token_expired: expired,
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            let headers = response.headers_mut();
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            if expired {
                headers.insert(
                    HeaderName::from_static(TOKEN_EXPIRED_HEADER),
                    HeaderValue::from_static("true"),
                );
            }
        }
        response
    }
}

/// Flag responses whose bearer token is valid but expires within the
/// configured window. Never rejects a request.
pub async fn expiry_notice(
    State(auth): State<Arc<AuthState>>,
    request: Request,
    next: Next,
) -> Response {
    let expiring_soon = authorization(request.headers())
        .and_then(extract_from_header)
        .and_then(|token| auth.verifier.peek(token, ExpiryPolicy::Ignore).ok())
        .is_some_and(|verified| {
            let window =
                i64::try_from(auth.config.expiry_notice_window().as_secs()).unwrap_or(i64::MAX);
            let remaining = verified.claims.exp - Utc::now().timestamp();
            remaining > 0 && remaining <= window
        });

    let mut response = next.run(request).await;
    if expiring_soon {
        response.headers_mut().insert(
            HeaderName::from_static(TOKEN_EXPIRING_SOON_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    response
}
