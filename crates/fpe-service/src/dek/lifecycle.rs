//! [`DekManager`]: the `ABSENT → CREATING → ACTIVE → DELETED` state machine.
//!
//! # Get-or-create contract
//!
//! Several executable instances may cold-start at once and all find the
//! secret absent. Each one generates a wrapped key and tries to create the
//! secret; the secret store's create-uniqueness decides the winner. Losers get
//! a duplicate-name conflict, discard their own key, and re-read the secret.
//!
//! Every caller, winner included, unwraps the blob that is actually persisted,
//! so all callers converge on one DEK. No lock is held across instances.
//!
//! If the secret disappears between a conflict and the re-read (concurrent
//! administrative deletion), creation is attempted again, at most
//! [`MAX_CREATE_ATTEMPTS`] times.

use std::sync::Arc;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::{DekBytes, DekError, MasterKeyManager, SecretStore, SecretStoreError};
use crate::crypto::{KeyId, KEY_LEN};

/// Upper bound on create attempts within one resolution.
pub const MAX_CREATE_ATTEMPTS: u32 = 3;

/// Description attached to the secret when it is created.
pub const SECRET_DESCRIPTION: &str = "FPE data encryption key protected by the FPE master key.";

/// How the resolved DEK came to be active for this caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DekOrigin {
    /// The secret already existed.
    Existing,
    /// This caller won the create.
    Created,
    /// This caller lost a create race and adopted the winner's key.
    AdoptedAfterConflict,
}

/// A plaintext DEK plus its non-secret identifier.
#[derive(Debug)]
pub struct ResolvedDek {
    pub key: DekBytes,
    pub key_id: KeyId,
    pub origin: DekOrigin,
}

enum Step {
    Lookup,
    Create,
    Reread,
    Unwrap(Vec<u8>, DekOrigin),
}

/// Resolves the DEK through the master key and secret store.
///
/// Cheap to clone; holds no key material between calls.
#[derive(Clone)]
pub struct DekManager {
    master: Arc<dyn MasterKeyManager>,
    secrets: Arc<dyn SecretStore>,
    master_key_id: String,
    secret_name: String,
}

impl DekManager {
    pub fn new(
        master: Arc<dyn MasterKeyManager>,
        secrets: Arc<dyn SecretStore>,
        master_key_id: impl Into<String>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            master,
            secrets,
            master_key_id: master_key_id.into(),
            secret_name: secret_name.into(),
        }
    }

    /// Resolve the DEK, creating it if the secret is absent.
    ///
    /// # Errors
    ///
    /// Returns [`DekError::Contended`] if the secret could not be pinned down
    /// within [`MAX_CREATE_ATTEMPTS`], or any master key / secret store error.
    pub async fn get_or_create(&self) -> Result<ResolvedDek, DekError> {
        let mut attempts = 0u32;
        let mut step = Step::Lookup;
        loop {
            step = match step {
                Step::Lookup => match self.read_wrapped().await? {
                    Some(wrapped) => Step::Unwrap(wrapped, DekOrigin::Existing),
                    None => Step::Create,
                },
                Step::Create => {
                    attempts += 1;
                    if attempts > MAX_CREATE_ATTEMPTS {
                        warn!(secret = %self.secret_name, attempts = MAX_CREATE_ATTEMPTS, "DEK creation contended");
                        return Err(DekError::Contended {
                            name: self.secret_name.clone(),
                            attempts: MAX_CREATE_ATTEMPTS,
                        });
                    }
                    let wrapped = self
                        .master
                        .generate_wrapped_key(&self.master_key_id, KEY_LEN)
                        .await?;
                    match self
                        .secrets
                        .create(&self.secret_name, &hex::encode(&wrapped), SECRET_DESCRIPTION)
                        .await
                    {
                        Ok(()) => Step::Unwrap(wrapped, DekOrigin::Created),
                        Err(SecretStoreError::AlreadyExists(_)) => {
                            debug!(secret = %self.secret_name, attempt = attempts, "DEK create conflict; re-reading");
                            Step::Reread
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                Step::Reread => match self.read_wrapped().await? {
                    Some(wrapped) => Step::Unwrap(wrapped, DekOrigin::AdoptedAfterConflict),
                    None => Step::Create,
                },
                Step::Unwrap(wrapped, origin) => return self.unwrap(&wrapped, origin).await,
            };
        }
    }

    /// Resolve the DEK only if it already exists. Never creates.
    ///
    /// # Errors
    ///
    /// Returns [`DekError::NotFound`] if the secret is absent.
    pub async fn resolve_existing(&self) -> Result<ResolvedDek, DekError> {
        match self.read_wrapped().await? {
            Some(wrapped) => self.unwrap(&wrapped, DekOrigin::Existing).await,
            None => Err(DekError::NotFound(self.secret_name.clone())),
        }
    }

    /// Administrative `ACTIVE → DELETED` transition.
    ///
    /// Ciphertext produced under the deleted DEK becomes unrecoverable. The
    /// next encrypting call creates a new DEK under the same name.
    pub async fn destroy(&self) -> Result<bool, DekError> {
        let deleted = self.secrets.delete(&self.secret_name).await?;
        if deleted {
            info!(secret = %self.secret_name, "DEK secret deleted");
        }
        Ok(deleted)
    }

    async fn read_wrapped(&self) -> Result<Option<Vec<u8>>, DekError> {
        match self.secrets.get(&self.secret_name).await? {
            Some(value) => hex::decode(value.trim())
                .map(Some)
                .map_err(|_| DekError::MalformedSecret(self.secret_name.clone())),
            None => Ok(None),
        }
    }

    async fn unwrap(&self, wrapped: &[u8], origin: DekOrigin) -> Result<ResolvedDek, DekError> {
        let plaintext =
            Zeroizing::new(self.master.unwrap_key(&self.master_key_id, wrapped).await?);
        let key = DekBytes::from_slice(&plaintext)?;

        let key_id = KeyId::of_wrapped(wrapped);
        match origin {
            DekOrigin::Existing => debug!(key_id = %key_id, "DEK resolved"),
            _ => info!(secret = %self.secret_name, key_id = %key_id, origin = ?origin, "DEK activated"),
        }
        Ok(ResolvedDek {
            key,
            key_id,
            origin,
        })
    }
}
