//! [`SecretStore`]: create / read / delete access to the persisted wrapped DEK.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors produced by a secret store.
#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// A secret with this name already exists (create lost a race).
    #[error("secret {0} already exists")]
    AlreadyExists(String),

    /// The caller's principal lacks the required grant.
    #[error("secret store denied access: {0}")]
    PermissionDenied(String),

    /// Any other backend failure (network, throttling, service error).
    #[error("secret store failure: {0}")]
    Backend(String),
}

/// Named secret storage with atomic create.
///
/// Implementations must guarantee that concurrent `create` calls for the same
/// name succeed at most once; every loser receives
/// [`SecretStoreError::AlreadyExists`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create `name` holding `value`. Fails if `name` already exists.
    async fn create(&self, name: &str, value: &str, description: &str)
        -> Result<(), SecretStoreError>;

    /// Read the current value of `name`, or `None` if it does not exist.
    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError>;

    /// Delete `name` immediately. Returns `false` if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, SecretStoreError>;
}

/// Process-local secret store used by the `local` key backend and in tests.
#[derive(Clone, Debug, Default)]
pub struct InMemorySecretStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn create(
        &self,
        name: &str,
        value: &str,
        _description: &str,
    ) -> Result<(), SecretStoreError> {
        let mut map = self.inner.write().await;
        if map.contains_key(name) {
            return Err(SecretStoreError::AlreadyExists(name.to_owned()));
        }
        map.insert(name.to_owned(), value.to_owned());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<String>, SecretStoreError> {
        Ok(self.inner.read().await.get(name).cloned())
    }

    async fn delete(&self, name: &str) -> Result<bool, SecretStoreError> {
        Ok(self.inner.write().await.remove(name).is_some())
    }
}
