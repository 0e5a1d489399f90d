//! Bearer-token authorization gate.
//!
//! Two stages, kept apart so each can be tested alone:
//!
//! 1. [`decision::authorize`] is a pure function of the `Authorization`
//!    header, the [`TrustPolicy`] and the [`TrustedKeySet`]. It never touches
//!    the network.
//! 2. [`middleware::require_bearer`] runs that decision in front of the
//!    operation routes and only forwards the request on `Allow`.
//!
//! The gate is fail-closed: anything that is not a verifiable token for a
//! known issuer and client is denied.

pub mod decision;
pub mod keys;
pub mod middleware;

pub use decision::{authorize, AuthorizerDecision, Principal, TokenUse, TrustPolicy};
pub use keys::{JwksSource, KeySetCache, KeySetError, TrustedKeySet};
pub use middleware::require_bearer;

use std::sync::Arc;

use thiserror::Error;

/// Why a request was denied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("Authorization header is not a bearer token")]
    NotBearer,

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("token is not signed by a trusted key")]
    UnknownKey,

    /// `none`, symmetric algorithms, or an algorithm that does not match the key.
    #[error("token algorithm {0} is not accepted")]
    DisallowedAlgorithm(String),

    /// Signature, expiry, or issuer check failed.
    #[error("token rejected: {0}")]
    InvalidToken(String),

    #[error("token_use must be access or id")]
    WrongTokenUse,

    #[error("token was not issued to a trusted client")]
    UnknownClient,
}

/// Policy plus the hot-swappable key set, shared by every request.
#[derive(Clone)]
pub struct Authorizer {
    policy: Arc<TrustPolicy>,
    keys: KeySetCache,
}

impl Authorizer {
    pub fn new(policy: TrustPolicy, keys: KeySetCache) -> Self {
        Self {
            policy: Arc::new(policy),
            keys,
        }
    }

    pub fn decide(&self, authorization: Option<&str>) -> AuthorizerDecision {
        authorize(authorization, &self.policy, &self.keys.load())
    }

    pub fn keys(&self) -> &KeySetCache {
        &self.keys
    }
}
