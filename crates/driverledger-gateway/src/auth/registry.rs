//! Refresh-token registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AuthError;

/// Live refresh token per subject. Setting a new token replaces the old one.
#[async_trait]
pub trait RefreshRegistry: Send + Sync {
    /// Current refresh token for a subject.
    async fn get(&self, subject: &str) -> Result<Option<String>, AuthError>;

    /// Record the refresh token just issued for a subject.
    async fn set(&self, subject: &str, token: String) -> Result<(), AuthError>;
}

/// Process-local registry. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryRefreshRegistry {
    tokens: RwLock<HashMap<String, String>>,
}

impl InMemoryRefreshRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshRegistry for InMemoryRefreshRegistry {
    async fn get(&self, subject: &str) -> Result<Option<String>, AuthError> {
        Ok(self.tokens.read().await.get(subject).cloned())
    }

    async fn set(&self, subject: &str, token: String) -> Result<(), AuthError> {
        self.tokens.write().await.insert(subject.to_string(), token);
        Ok(())
    }
}
