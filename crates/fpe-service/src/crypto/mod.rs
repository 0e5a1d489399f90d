//! Field-level cryptographic primitives.
//!
//! This module is intentionally free of AWS and HTTP dependencies.
//!
//! - [`ff1`]: NIST SP 800-38G FF1 format-preserving encryption over the
//!   `0-9a-z` alphabet, used by `encrypt` / `decrypt`.
//! - [`cipher`]: AES-256-GCM-SIV sealing, used by the envelope operations and
//!   by the local master key to wrap DEKs.
//!
//! # Sealed envelope format
//!
//! ```text
//! v1.<base64url(key-id)>.<base64url(nonce)>.<base64url(ciphertext+tag)>
//! ```
//!
//! `key-id` binds every envelope ciphertext to the DEK that produced it.

pub mod cipher;
pub mod ff1;

pub use cipher::{KeyId, SealedField, KEY_LEN};
