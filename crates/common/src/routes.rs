//! The route table and CORS policy shared by the router and the deployment plan.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the four cryptographic operations, each bound to one `POST` route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    Encrypt,
    Decrypt,
    EnvelopeEncrypt,
    EnvelopeDecrypt,
}

impl Operation {
    /// All operations, in route-registration order.
    pub const ALL: [Operation; 4] = [
        Operation::Encrypt,
        Operation::Decrypt,
        Operation::EnvelopeEncrypt,
        Operation::EnvelopeDecrypt,
    ];

    /// URL path of the route serving this operation.
    pub fn path(self) -> &'static str {
        match self {
            Operation::Encrypt => "/encrypt",
            Operation::Decrypt => "/decrypt",
            Operation::EnvelopeEncrypt => "/envelope-encrypt",
            Operation::EnvelopeDecrypt => "/envelope-decrypt",
        }
    }

    /// Label reported in the `operation` field of responses.
    pub fn label(self) -> &'static str {
        match self {
            Operation::Encrypt => "Encrypt",
            Operation::Decrypt => "Decrypt",
            Operation::EnvelopeEncrypt => "Envelope-Encrypt",
            Operation::EnvelopeDecrypt => "Envelope-Decrypt",
        }
    }

    /// `true` for operations keyed by the master-key-protected DEK.
    pub fn is_envelope(self) -> bool {
        matches!(self, Operation::EnvelopeEncrypt | Operation::EnvelopeDecrypt)
    }

    /// `true` if the operation may create the DEK on first use.
    ///
    /// Decrypting operations never create a key: ciphertext produced under a
    /// deleted DEK must stay unrecoverable.
    pub fn creates_key(self) -> bool {
        matches!(self, Operation::Encrypt | Operation::EnvelopeEncrypt)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path()[1..])
    }
}

/// Deployment configuration variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Four routes, master-key-protected DEK, bearer-token authorizer.
    #[default]
    Full,
    /// Legacy variant: `encrypt` / `decrypt` only, static key, no authorizer.
    Minimal,
}

impl Profile {
    /// Operations exposed as routes under this profile.
    pub fn operations(self) -> &'static [Operation] {
        match self {
            Profile::Full => &Operation::ALL,
            Profile::Minimal => &Operation::ALL[..2],
        }
    }

    /// Whether every route must pass the bearer-token authorizer.
    pub fn requires_authorizer(self) -> bool {
        matches!(self, Profile::Full)
    }

    /// Whether operations are keyed by a DEK held in the secret store.
    pub fn uses_dek(self) -> bool {
        matches!(self, Profile::Full)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Full => f.write_str("full"),
            Profile::Minimal => f.write_str("minimal"),
        }
    }
}

/// Cross-origin policy applied to every route.
///
/// Any origin may call, but only with `POST` and this fixed header allow-list.
/// Suitable for trusted-client deployments only.
pub mod cors {
    /// Request headers a cross-origin caller may send.
    pub const ALLOWED_HEADERS: [&str; 4] = ["Content-Type", "X-Amz-Date", "Authorization", "X-Api-Key"];
    /// Methods a cross-origin caller may use.
    pub const ALLOWED_METHODS: [&str; 1] = ["POST"];
    /// Origins allowed to call.
    pub const ALLOWED_ORIGINS: [&str; 1] = ["*"];
}
