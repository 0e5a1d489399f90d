//! Request and response types exchanged between components.
//!
//! [`FpeRequest`] / [`FpeResponse`] are the JSON bodies of the four
//! cryptographic routes. The router never inspects them: it wraps the raw
//! request bytes in an [`Invocation`] and relays the [`InvocationOutput`]
//! back to the caller unchanged.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::routes::{Operation, Profile};

// ---------------------------------------------------------------------------
// Cryptographic operations
// ---------------------------------------------------------------------------

/// Default numeral radix for `encrypt` / `decrypt` (decimal digits).
pub const DEFAULT_RADIX: u32 = 10;

/// Radix reported in responses for envelope operations, which have none.
pub const ENVELOPE_RADIX: i32 = -1;

/// Request body for every cryptographic route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpeRequest {
    /// Plaintext (encrypting operations) or ciphertext (decrypting operations).
    pub input: String,

    /// Alphabet size for FF1 operations; ignored by envelope operations.
    #[serde(default = "default_radix")]
    pub radix: u32,
}

fn default_radix() -> u32 {
    DEFAULT_RADIX
}

/// Successful response body for every cryptographic route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FpeResponse {
    /// Operation label, e.g. `"Encrypt"` or `"Envelope-Decrypt"`.
    pub operation: String,
    pub plaintext: String,
    pub ciphertext: String,
    /// FF1 radix, or [`ENVELOPE_RADIX`] for envelope operations.
    pub radix: i32,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(err: &ServiceError) -> Self {
        Self::new(err.code(), err.message())
    }
}

// ---------------------------------------------------------------------------
// Executable invocation envelope
// ---------------------------------------------------------------------------

/// A single request handed from the router to the executable.
///
/// `body` holds the caller's payload exactly as received.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub operation: Operation,
    pub body: Bytes,
}

/// The executable's reply, relayed to the caller unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOutput {
    /// HTTP status code.
    pub status: u16,
    /// JSON response body.
    pub body: Bytes,
}

impl InvocationOutput {
    /// Serialise `value` as a JSON body with the given status.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                body: Bytes::from(body),
            },
            Err(e) => Self::from_error(&ServiceError::Internal(format!(
                "failed to serialise response: {e}"
            ))),
        }
    }

    /// Build an error reply carrying an [`ErrorResponse`] body.
    pub fn from_error(err: &ServiceError) -> Self {
        let body = serde_json::to_vec(&ErrorResponse::from(err)).unwrap_or_default();
        Self {
            status: err.http_status(),
            body: Bytes::from(body),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Deployment profile in effect.
    pub profile: Profile,
    /// Number of trusted token-signing keys currently loaded.
    pub signing_keys_loaded: usize,
}
