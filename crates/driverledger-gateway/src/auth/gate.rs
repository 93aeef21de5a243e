//! Request authentication gates.
//!
//! The strict gate rejects any token that fails verification. The lenient
//! gate additionally accepts a token whose only fault is being expired, so
//! clients holding a stale access token can keep writing until they renew.

use super::AuthError;
use super::jwt::{Claims, ExpiryPolicy, TokenType, TokenVerifier, extract_from_header};
use super::users::{User, UserDirectory};

/// The user resolved from a request's bearer token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    /// Resolved user.
    pub user: User,
    /// Token claims.
    pub claims: Claims,
    /// Whether the token was accepted despite being expired.
    pub expired: bool,
}

/// Resolves the caller from an Authorization header.
#[derive(Debug, Clone)]
pub struct AuthenticationGate {
    verifier: TokenVerifier,
    users: UserDirectory,
}

impl AuthenticationGate {
    /// Create a gate.
    #[must_use]
    pub const fn new(verifier: TokenVerifier, users: UserDirectory) -> Self {
        Self { verifier, users }
    }

    /// Strict gate: the token must verify with expiry enforced.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials`, `ExpiredSignature`, `InvalidSignature`,
    /// `WrongTokenType`, `MissingSubject` or `UnknownSubject`.
    pub async fn require_valid_user(
        &self,
        authorization: Option<&str>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let token = bearer_token(authorization)?;
        let verified = self.verifier.verify(token, ExpiryPolicy::Enforce)?;
        self.resolve(verified.claims, false).await
    }

    /// Lenient gate: like the strict gate, but an expired token is given a
    /// second pass with expiry ignored.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredentials`, `InvalidSignature`, `WrongTokenType`,
    /// `MissingSubject` or `UnknownSubject`.
    pub async fn require_user_allow_expired(
        &self,
        authorization: Option<&str>,
    ) -> Result<VerifiedIdentity, AuthError> {
        let token = bearer_token(authorization)?;
        match self.verifier.verify(token, ExpiryPolicy::Enforce) {
            Ok(verified) => self.resolve(verified.claims, false).await,
            Err(AuthError::ExpiredSignature(_)) => {
                let verified = self.verifier.verify(token, ExpiryPolicy::Ignore)?;
                tracing::debug!(key = %verified.key, "accepting expired token");
                self.resolve(verified.claims, true).await
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve(&self, claims: Claims, expired: bool) -> Result<VerifiedIdentity, AuthError> {
        if claims.token_type == Some(TokenType::Refresh) {
            return Err(AuthError::WrongTokenType);
        }

        let subject = claims
            .sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?;

        let user = self
            .users
            .find_by_username(subject)
            .await?
            .ok_or_else(|| AuthError::UnknownSubject(subject.to_string()))?;

        Ok(VerifiedIdentity {
            user,
            claims,
            expired,
        })
    }
}

fn bearer_token(authorization: Option<&str>) -> Result<&str, AuthError> {
    authorization
        .and_then(extract_from_header)
        .ok_or(AuthError::MissingCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use driverledger_core::SledDocumentStore;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::SecretString;

    use crate::auth::keyring::KeyRing;
    use crate::auth::jwt::TokenIssuer;
    use crate::auth::registry::InMemoryRefreshRegistry;

    struct Fixture {
        gate: AuthenticationGate,
        issuer: TokenIssuer,
        legacy: TokenIssuer,
        foreign: TokenIssuer,
    }

    fn ring(primary: &str, alternates: &[&str]) -> Arc<KeyRing> {
        Arc::new(
            KeyRing::new(
                &SecretString::from(primary.to_string()),
                alternates.iter().map(|s| SecretString::from((*s).to_string())),
            )
            .unwrap(),
        )
    }

    fn issuer(keys: Arc<KeyRing>) -> TokenIssuer {
        TokenIssuer::new(
            keys,
            Arc::new(InMemoryRefreshRegistry::new()),
            Duration::from_secs(1800),
            Duration::from_secs(86400),
        )
        .unwrap()
    }

    async fn fixture() -> Fixture {
        let keys = ring("current", &["retired"]);
        let users = UserDirectory::new(Arc::new(SledDocumentStore::temporary().unwrap()));
        users.create("ana", "h".into(), None, None).await.unwrap();

        Fixture {
            gate: AuthenticationGate::new(TokenVerifier::new(Arc::clone(&keys)), users),
            issuer: issuer(keys),
            legacy: issuer(ring("retired", &[])),
            foreign: issuer(ring("stranger", &[])),
        }
    }

    fn bearer(token: &str) -> String {
        format!("Bearer {token}")
    }

    #[tokio::test]
    async fn test_fresh_token_passes_both_gates() {
        let f = fixture().await;
        let token = f.issuer.issue_access_token("ana").unwrap().token;

        let strict = f.gate.require_valid_user(Some(&bearer(&token))).await.unwrap();
        assert_eq!(strict.user.username, "ana");
        assert!(!strict.expired);

        let lenient = f
            .gate
            .require_user_allow_expired(Some(&bearer(&token)))
            .await
            .unwrap();
        assert_eq!(lenient.user.username, "ana");
    }

    #[tokio::test]
    async fn test_legacy_key_passes_both_gates() {
        let f = fixture().await;
        let token = f.legacy.issue_access_token("ana").unwrap().token;

        assert!(f.gate.require_valid_user(Some(&bearer(&token))).await.is_ok());
        assert!(
            f.gate
                .require_user_allow_expired(Some(&bearer(&token)))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_expired_token() {
        let f = fixture().await;
        let token = f
            .issuer
            .issue_access_token_with_ttl("ana", chrono::Duration::minutes(-10))
            .unwrap()
            .token;

        let strict = f.gate.require_valid_user(Some(&bearer(&token))).await;
        assert!(matches!(strict, Err(AuthError::ExpiredSignature(_))));

        let lenient = f
            .gate
            .require_user_allow_expired(Some(&bearer(&token)))
            .await
            .unwrap();
        assert_eq!(lenient.user.username, "ana");
        assert!(lenient.expired);
    }

    #[tokio::test]
    async fn test_token_expired_seconds_ago() {
        let f = fixture().await;
        let token = f
            .issuer
            .issue_access_token_with_ttl("ana", chrono::Duration::seconds(-30))
            .unwrap()
            .token;

        let strict = f.gate.require_valid_user(Some(&bearer(&token))).await;
        assert!(matches!(strict, Err(AuthError::ExpiredSignature(_))));

        let lenient = f
            .gate
            .require_user_allow_expired(Some(&bearer(&token)))
            .await
            .unwrap();
        assert!(lenient.expired);
    }

    #[tokio::test]
    async fn test_expired_legacy_token_lenient() {
        let f = fixture().await;
        let token = f
            .legacy
            .issue_access_token_with_ttl("ana", chrono::Duration::days(-3))
            .unwrap()
            .token;

        let lenient = f
            .gate
            .require_user_allow_expired(Some(&bearer(&token)))
            .await
            .unwrap();
        assert_eq!(lenient.user.username, "ana");
    }

    #[tokio::test]
    async fn test_unknown_key_fails_both_gates() {
        let f = fixture().await;
        let fresh = f.foreign.issue_access_token("ana").unwrap().token;
        let stale = f
            .foreign
            .issue_access_token_with_ttl("ana", chrono::Duration::minutes(-10))
            .unwrap()
            .token;

        for token in [&fresh, &stale] {
            assert!(matches!(
                f.gate.require_valid_user(Some(&bearer(token))).await,
                Err(AuthError::InvalidSignature(_))
            ));
            assert!(matches!(
                f.gate.require_user_allow_expired(Some(&bearer(token))).await,
                Err(AuthError::InvalidSignature(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_missing_credentials() {
        let f = fixture().await;
        assert!(matches!(
            f.gate.require_valid_user(None).await,
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            f.gate.require_user_allow_expired(Some("Token abc")).await,
            Err(AuthError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unknown_subject_and_missing_subject() {
        let f = fixture().await;
        let ghost = f.issuer.issue_access_token("ghost").unwrap().token;
        assert!(matches!(
            f.gate.require_valid_user(Some(&bearer(&ghost))).await,
            Err(AuthError::UnknownSubject(_))
        ));

        let claims = serde_json::json!({"exp": chrono::Utc::now().timestamp() + 600});
        let anonymous = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"current"),
        )
        .unwrap();
        assert!(matches!(
            f.gate.require_valid_user(Some(&bearer(&anonymous))).await,
            Err(AuthError::MissingSubject)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_refused() {
        let f = fixture().await;
        let refresh = f.issuer.issue_refresh_token("ana").await.unwrap().token;
        assert!(matches!(
            f.gate.require_valid_user(Some(&bearer(&refresh))).await,
            Err(AuthError::WrongTokenType)
        ));
    }

    #[tokio::test]
    async fn test_untyped_legacy_token_accepted() {
        let f = fixture().await;
        let claims = serde_json::json!({
            "sub": "ana",
            "exp": chrono::Utc::now().timestamp() + 600,
        });
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"retired"),
        )
        .unwrap();
        let identity = f.gate.require_valid_user(Some(&bearer(&token))).await.unwrap();
        assert_eq!(identity.claims.token_type, None);
    }
}
