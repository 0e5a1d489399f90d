//! Common error types shared across crates.

use thiserror::Error;

/// Top-level service error type.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`ServiceError::BadRequest`] → 400
/// - [`ServiceError::Unauthorized`] → 401
/// - [`ServiceError::UnhandledOperation`] → 405
/// - [`ServiceError::EncryptionFailure`] → 500
/// - [`ServiceError::PermissionDenied`] → 500
/// - [`ServiceError::Unavailable`] → 503
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was malformed: invalid JSON, bad radix, or input outside the alphabet.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The bearer token was missing, malformed, or failed verification.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The operation is not served by the active deployment profile.
    #[error("unhandled operation: {0}")]
    UnhandledOperation(String),

    /// Encryption or decryption failed due to a crypto-layer or key-resolution error.
    #[error("encryption failure: {0}")]
    EncryptionFailure(String),

    /// The executable's principal lacks a grant on the master key or secret store.
    ///
    /// Surfaced as a server error and never retried automatically.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A required collaborator is temporarily unavailable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// An unexpected internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::BadRequest(_) => 400,
            ServiceError::Unauthorized(_) => 401,
            ServiceError::UnhandledOperation(_) => 405,
            ServiceError::EncryptionFailure(_) => 500,
            ServiceError::PermissionDenied(_) => 500,
            ServiceError::Unavailable(_) => 503,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Short machine-readable code used in [`crate::protocol::ErrorResponse`].
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::UnhandledOperation(_) => "unhandled_operation",
            ServiceError::EncryptionFailure(_) => "encryption_failure",
            ServiceError::PermissionDenied(_) => "permission_denied",
            ServiceError::Unavailable(_) => "service_unavailable",
            ServiceError::Internal(_) => "internal_error",
        }
    }

    /// The inner message without the variant prefix, safe to expose to callers.
    pub fn message(&self) -> &str {
        match self {
            ServiceError::BadRequest(m)
            | ServiceError::Unauthorized(m)
            | ServiceError::UnhandledOperation(m)
            | ServiceError::EncryptionFailure(m)
            | ServiceError::PermissionDenied(m)
            | ServiceError::Unavailable(m)
            | ServiceError::Internal(m) => m,
        }
    }
}
