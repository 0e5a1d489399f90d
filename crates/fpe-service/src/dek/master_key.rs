//! [`MasterKeyManager`]: the key that wraps and unwraps the DEK.
//!
//! Callers never see master key material. Rotation is the key manager's own
//! concern and is transparent here: blobs wrapped under an older key version
//! still unwrap.

use async_trait::async_trait;
use thiserror::Error;

use zeroize::Zeroizing;

use super::DekBytes;
use crate::crypto::cipher::{self, NONCE_LEN};

/// Errors produced by the master key manager.
#[derive(Debug, Error)]
pub enum MasterKeyError {
    /// The referenced master key does not exist (or was destroyed).
    #[error("master key {0} not found")]
    NotFound(String),

    /// The caller's principal lacks encrypt/decrypt on the master key.
    #[error("master key denied access: {0}")]
    PermissionDenied(String),

    /// The wrapped blob was not produced by this master key or is corrupt.
    #[error("wrapped key could not be unwrapped")]
    InvalidCiphertext,

    /// Any other backend failure.
    #[error("master key failure: {0}")]
    Backend(String),
}

/// Wrap/unwrap operations of the master key. Never used on payload data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MasterKeyManager: Send + Sync {
    /// Generate a fresh random data key of `len` bytes and return it wrapped
    /// under master key `key_id`. The plaintext is never returned.
    async fn generate_wrapped_key(&self, key_id: &str, len: usize)
        -> Result<Vec<u8>, MasterKeyError>;

    /// Unwrap a blob produced by [`MasterKeyManager::generate_wrapped_key`].
    async fn unwrap_key(&self, key_id: &str, wrapped: &[u8]) -> Result<Vec<u8>, MasterKeyError>;
}

/// In-process master key for the `local` key backend.
///
/// Wraps data keys with AES-256-GCM-SIV. The key exists only for the life of
/// the process, matching a destroy-on-teardown master key.
pub struct LocalMasterKey {
    key_id: String,
    key: DekBytes,
}

impl LocalMasterKey {
    /// Create a master key with fresh random material.
    pub fn generate(key_id: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            key: DekBytes::random(),
        }
    }

    fn check_id(&self, key_id: &str) -> Result<(), MasterKeyError> {
        if key_id != self.key_id {
            return Err(MasterKeyError::NotFound(key_id.to_owned()));
        }
        Ok(())
    }
}

impl std::fmt::Debug for LocalMasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMasterKey")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl MasterKeyManager for LocalMasterKey {
    async fn generate_wrapped_key(
        &self,
        key_id: &str,
        len: usize,
    ) -> Result<Vec<u8>, MasterKeyError> {
        self.check_id(key_id)?;
        let plaintext = Zeroizing::new(cipher::random_bytes(len));
        let sealed = cipher::encrypt_bytes(&plaintext, self.key.as_bytes());

        let (nonce, ciphertext) =
            sealed.map_err(|e| MasterKeyError::Backend(format!("wrap failed: {e}")))?;
        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    async fn unwrap_key(&self, key_id: &str, wrapped: &[u8]) -> Result<Vec<u8>, MasterKeyError> {
        self.check_id(key_id)?;
        if wrapped.len() <= NONCE_LEN {
            return Err(MasterKeyError::InvalidCiphertext);
        }
        let (nonce, ciphertext) = wrapped.split_at(NONCE_LEN);
        let nonce: [u8; NONCE_LEN] = nonce
            .try_into()
            .map_err(|_| MasterKeyError::InvalidCiphertext)?;
        cipher::decrypt_bytes(&nonce, ciphertext, self.key.as_bytes())
            .map_err(|_| MasterKeyError::InvalidCiphertext)
    }
}
