//! AES-256-GCM-SIV sealing of envelope payloads and wrapped keys.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! Each call still draws a fresh 96-bit nonce from the OS CSPRNG.
//!
//! **Do NOT substitute plain AES-256-GCM with a fixed nonce.** GCM nonce reuse
//! is catastrophic: it breaks both confidentiality and authentication.

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of a [`KeyId`].
pub const KEY_ID_LEN: usize = 8;

/// Prefix that appears at the start of every sealed value.
pub const VERSION_PREFIX: &str = "v1";

/// Errors produced by the cipher layer.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// AES-GCM-SIV encryption or decryption failed.
    #[error("aead operation failed")]
    AeadFailure,

    /// The sealed string does not match the expected format.
    #[error("invalid sealed value format")]
    InvalidFormat,

    /// The value was sealed under a different data encryption key.
    #[error("ciphertext was sealed under a different data encryption key")]
    KeyMismatch,
}

/// Short, non-secret identifier of a DEK.
///
/// Derived from the *wrapped* DEK blob, so it can be computed without the
/// plaintext key and changes whenever the DEK is recreated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyId(pub [u8; KEY_ID_LEN]);

impl KeyId {
    /// First [`KEY_ID_LEN`] bytes of SHA-256 over the wrapped key blob.
    pub fn of_wrapped(wrapped: &[u8]) -> Self {
        let digest = Sha256::digest(wrapped);
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&digest[..KEY_ID_LEN]);
        Self(id)
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A parsed envelope ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedField {
    /// Identifier of the DEK the value was sealed under.
    pub key_id: KeyId,
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl SealedField {
    /// Encode this value to its canonical string representation.
    pub fn to_string_repr(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            VERSION_PREFIX,
            URL_SAFE_NO_PAD.encode(self.key_id.0),
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }

    /// Parse a sealed string back into a [`SealedField`].
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidFormat`] if the string does not match the
    /// `v1.<key-id>.<nonce>.<ciphertext>` structure.
    pub fn parse(s: &str) -> Result<Self, CipherError> {
        let parts: Vec<&str> = s.trim().splitn(4, '.').collect();
        if parts.len() != 4 || parts[0] != VERSION_PREFIX {
            return Err(CipherError::InvalidFormat);
        }
        let key_id = decode_fixed::<KEY_ID_LEN>(parts[1])?;
        let nonce = decode_fixed::<NONCE_LEN>(parts[2])?;
        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[3])
            .map_err(|_| CipherError::InvalidFormat)?;

        Ok(Self {
            key_id: KeyId(key_id),
            nonce,
            ciphertext,
        })
    }
}

fn decode_fixed<const N: usize>(part: &str) -> Result<[u8; N], CipherError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| CipherError::InvalidFormat)?;
    bytes.try_into().map_err(|_| CipherError::InvalidFormat)
}

/// Seal `plaintext` under `dek`, tagging the result with `key_id`.
///
/// # Errors
///
/// Returns [`CipherError::InvalidKeyLength`] if `dek` is not [`KEY_LEN`] bytes.
pub fn seal(plaintext: &[u8], dek: &[u8], key_id: KeyId) -> Result<SealedField, CipherError> {
    let (nonce, ciphertext) = encrypt_bytes(plaintext, dek)?;
    Ok(SealedField {
        key_id,
        nonce,
        ciphertext,
    })
}

/// Open a [`SealedField`] with `dek`, whose identifier must be `key_id`.
///
/// # Errors
///
/// Returns [`CipherError::KeyMismatch`] if the field names a different key,
/// and [`CipherError::AeadFailure`] if authentication fails.
pub fn open(field: &SealedField, dek: &[u8], key_id: KeyId) -> Result<Vec<u8>, CipherError> {
    if field.key_id != key_id {
        return Err(CipherError::KeyMismatch);
    }
    decrypt_bytes(&field.nonce, &field.ciphertext, dek)
}

/// Encrypt raw bytes with a fresh random nonce, returning `(nonce, ciphertext)`.
pub fn encrypt_bytes(
    plaintext: &[u8],
    key: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>), CipherError> {
    let cipher = build_cipher(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| CipherError::AeadFailure)?;
    Ok((nonce_bytes, ciphertext))
}

/// Decrypt bytes produced by [`encrypt_bytes`].
pub fn decrypt_bytes(
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    key: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = build_cipher(key)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CipherError::AeadFailure)
}

/// Fill a fresh buffer of `len` bytes from the OS CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    OsRng.fill_bytes(&mut buf);
    buf
}

fn build_cipher(key: &[u8]) -> Result<Aes256GcmSiv, CipherError> {
    if key.len() != KEY_LEN {
        return Err(CipherError::InvalidKeyLength);
    }
    Aes256GcmSiv::new_from_slice(key).map_err(|_| CipherError::InvalidKeyLength)
}
