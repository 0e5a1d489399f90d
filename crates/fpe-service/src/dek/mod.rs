//! DEK (Data Encryption Key) lifecycle: envelope protection, get-or-create, deletion.
//!
//! # Key hierarchy
//!
//! 1. A single rotating master key lives in the key manager
//!    ([`MasterKeyManager`]). It never encrypts payload data; it only wraps
//!    and unwraps the DEK.
//! 2. The wrapped DEK is persisted, hex encoded, in the secret store
//!    ([`SecretStore`]) under a well-known name such as `/secret/fpe/dek`.
//! 3. On every invocation the executable reads the wrapped DEK and unwraps it
//!    through the master key ([`DekManager`]). The plaintext DEK lives only
//!    in a [`DekBytes`] buffer for the duration of that invocation.
//!
//! # Secret lifecycle
//!
//! `ABSENT → CREATING → ACTIVE → DELETED`, driven by
//! [`DekManager::get_or_create`] and [`DekManager::destroy`]. See
//! [`lifecycle`] for the concurrency contract.
//!
//! # Security invariants
//!
//! - The plaintext DEK is **never** written to disk, logged, or included in traces.
//! - Losing the master key makes every wrapped DEK, and therefore every
//!   ciphertext produced under it, unrecoverable.

pub mod lifecycle;
pub mod master_key;
pub mod store;

pub use lifecycle::{DekManager, DekOrigin, ResolvedDek};
pub use master_key::{LocalMasterKey, MasterKeyError, MasterKeyManager};
pub use store::{InMemorySecretStore, SecretStore, SecretStoreError};

use aes_gcm_siv::aead::{rand_core::RngCore, OsRng};
use thiserror::Error;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::crypto::KEY_LEN;

/// Errors produced by the DEK layer.
#[derive(Debug, Error)]
pub enum DekError {
    /// No DEK secret exists and the caller is not allowed to create one.
    #[error("data encryption key {0} does not exist")]
    NotFound(String),

    /// The unwrapped key material has an unexpected length.
    #[error("DEK has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// The persisted secret value is not a hex-encoded wrapped key.
    #[error("DEK secret {0} does not hold a hex-encoded wrapped key")]
    MalformedSecret(String),

    /// The secret kept disappearing between a create conflict and the re-read.
    #[error("DEK secret {name} could not be resolved after {attempts} create attempts")]
    Contended { name: String, attempts: u32 },

    #[error(transparent)]
    SecretStore(#[from] SecretStoreError),

    #[error(transparent)]
    MasterKey(#[from] MasterKeyError),
}

impl DekError {
    /// `true` if the failure is a missing grant on the master key or secret store.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            DekError::SecretStore(SecretStoreError::PermissionDenied(_))
                | DekError::MasterKey(MasterKeyError::PermissionDenied(_))
        )
    }
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// Backed by [`Zeroizing`], so the bytes are wiped with volatile writes when
/// the buffer is dropped.
#[derive(Clone)]
pub struct DekBytes(Box<Zeroizing<[u8; KEY_LEN]>>);

impl DekBytes {
    /// Copy `key_bytes` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DekError::InvalidLength`] if the slice is not [`KEY_LEN`] bytes.
    pub fn from_slice(key_bytes: &[u8]) -> Result<Self, DekError> {
        if key_bytes.len() != KEY_LEN {
            return Err(DekError::InvalidLength(key_bytes.len()));
        }
        let mut buf = Box::new(Zeroizing::new([0u8; KEY_LEN]));
        buf.copy_from_slice(key_bytes);
        Ok(Self(buf))
    }

    /// Fresh key from the OS RNG.
    pub(crate) fn random() -> Self {
        let mut buf = Box::new(Zeroizing::new([0u8; KEY_LEN]));
        OsRng.fill_bytes(&mut buf[..]);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl ZeroizeOnDrop for DekBytes {}

impl std::fmt::Debug for DekBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material, not even in debug builds.
        f.write_str("DekBytes([REDACTED])")
    }
}
