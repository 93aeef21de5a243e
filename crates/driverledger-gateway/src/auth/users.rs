//! User model and directory.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use driverledger_core::{Collection, DocumentStore, Record, Repository, new_id};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use validator::Validate;

use super::AuthError;

/// User account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Username for login. Unique.
    pub username: String,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Profile picture URL.
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// Argon2 password hash (stored in DB, not exposed in public API).
    pub password_hash: String,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the profile last changed.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    /// Create a safe version of user for API responses (no password hash).
    #[must_use]
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            profile_picture: self.profile_picture.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Public user representation (for API responses).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    /// Unique user ID.
    pub id: String,
    /// Username.
    pub username: String,
    /// Email address.
    pub email: Option<String>,
    /// Profile picture URL.
    pub profile_picture: Option<String>,
    /// When created.
    pub created_at: DateTime<Utc>,
    /// Last profile change.
    pub updated_at: Option<DateTime<Utc>>,
}

/// Registration request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewUser {
    /// Desired username.
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    /// Email address.
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    /// Profile picture URL.
    #[serde(default)]
    pub profile_picture: Option<String>,
    /// Plaintext password.
    #[validate(length(min = 1))]
    pub password: String,
}

impl NewUser {
    /// Trim the username and treat blank optional fields as absent.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.username = self.username.trim().to_string();
        self.email = blank_to_none(self.email);
        self.profile_picture = blank_to_none(self.profile_picture);
        self
    }
}

/// Profile changes. The password cannot be changed here.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileUpdate {
    /// New username.
    #[serde(default)]
    #[validate(length(min = 1, max = 64))]
    pub username: Option<String>,
    /// New email address.
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
    /// New profile picture URL.
    #[serde(default)]
    pub profile_picture: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Username lookup and account creation over the `users` collection.
#[derive(Clone)]
pub struct UserDirectory {
    users: Repository<User>,
    writes: Arc<Mutex<()>>,
}

impl UserDirectory {
    /// Create a directory over a document store.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            users: Repository::new(store),
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Get a user by ID.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn get(&self, id: &str) -> Result<Option<User>, AuthError> {
        Ok(self.users.get(id).await?)
    }

    /// Get a user by username.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, AuthError> {
        Ok(self
            .users
            .find(|u| u.username == username)
            .await?
            .into_iter()
            .next())
    }

    /// Store a new account.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateUsername` if the username is taken; the existing
    /// account is left untouched.
    pub async fn create(
        &self,
        username: &str,
        password_hash: String,
        email: Option<String>,
        profile_picture: Option<String>,
    ) -> Result<User, AuthError> {
        let _guard = self.writes.lock().await;

        if self.find_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateUsername(username.to_string()));
        }

        let user = User {
            id: new_id(),
            username: username.to_string(),
            email,
            profile_picture,
            password_hash,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.users.insert(&user).await?;

        tracing::info!(user = %user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Apply profile changes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSubject` if the user is gone or `DuplicateUsername` if
    /// the new username is taken by someone else.
    pub async fn update_profile(
        &self,
        id: &str,
        update: ProfileUpdate,
    ) -> Result<User, AuthError> {
        let _guard = self.writes.lock().await;

        let mut user = self
            .get(id)
            .await?
            .ok_or_else(|| AuthError::UnknownSubject(id.to_string()))?;

        if let Some(username) = blank_to_none(update.username) {
            if username != user.username {
                if self.find_by_username(&username).await?.is_some() {
                    return Err(AuthError::DuplicateUsername(username));
                }
                user.username = username;
            }
        }
        if let Some(email) = blank_to_none(update.email) {
            user.email = Some(email);
        }
        if let Some(picture) = update.profile_picture {
            user.profile_picture = blank_to_none(Some(picture));
        }
        user.updated_at = Some(Utc::now());

        self.users.insert(&user).await?;
        tracing::debug!(user = %user.id, "profile updated");
        Ok(user)
    }

    /// Number of registered users.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn count(&self) -> Result<usize, AuthError> {
        Ok(self.users.list().await?.len())
    }
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driverledger_core::SledDocumentStore;

    fn directory() -> UserDirectory {
        UserDirectory::new(Arc::new(SledDocumentStore::temporary().unwrap()))
    }

    #[tokio::test]
    async fn test_create_and_lookup() {
        let users = directory();
        let user = users
            .create("ana", "hash-a".into(), Some("ana@example.com".into()), None)
            .await
            .unwrap();

        let by_name = users.find_by_username("ana").await.unwrap().unwrap();
        assert_eq!(by_name.id, user.id);
        assert_eq!(users.get(&user.id).await.unwrap(), Some(user));
        assert!(users.find_by_username("bia").await.unwrap().is_none());
        assert_eq!(users.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_keeps_original() {
        let users = directory();
        users.create("ana", "hash-a".into(), None, None).await.unwrap();

        let result = users.create("ana", "hash-b".into(), None, None).await;
        assert!(matches!(result, Err(AuthError::DuplicateUsername(_))));

        let stored = users.find_by_username("ana").await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "hash-a");
        assert_eq!(users.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_profile() {
        let users = directory();
        let ana = users.create("ana", "h".into(), None, None).await.unwrap();
        users.create("bia", "h".into(), None, None).await.unwrap();

        let taken = users
            .update_profile(
                &ana.id,
                ProfileUpdate {
                    username: Some("bia".into()),
                    ..ProfileUpdate::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(AuthError::DuplicateUsername(_))));

        let updated = users
            .update_profile(
                &ana.id,
                ProfileUpdate {
                    username: Some("ana2".into()),
                    email: Some("ana@example.com".into()),
                    profile_picture: Some("https://example.com/a.png".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.username, "ana2");
        assert_eq!(updated.password_hash, "h");
        assert!(updated.updated_at.is_some());
    }

    #[test]
    fn test_new_user_validation() {
        let ok = NewUser {
            username: " ana ".into(),
            email: Some(String::new()),
            profile_picture: None,
            password: "pw".into(),
        }
        .normalized();
        assert_eq!(ok.username, "ana");
        assert_eq!(ok.email, None);
        assert!(ok.validate().is_ok());

        let bad_email = NewUser {
            username: "ana".into(),
            email: Some("not-an-email".into()),
            profile_picture: None,
            password: "pw".into(),
        };
        assert!(bad_email.validate().is_err());
    }

    #[test]
    fn test_public_user_has_no_hash() {
        let user = User {
            id: "u1".into(),
            username: "ana".into(),
            email: None,
            profile_picture: None,
            password_hash: "secret-hash".into(),
            created_at: Utc::now(),
            updated_at: None,
        };
        let body = serde_json::to_string(&user.to_public()).unwrap();
        assert!(!body.contains("secret-hash"));
    }
}
