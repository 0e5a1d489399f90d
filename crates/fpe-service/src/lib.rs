//! FPE pseudonymization service.
//!
//! - [`crypto`]: FF1 and AES-GCM-SIV primitives.
//! - [`dek`]: master key / DEK envelope and the get-or-create lifecycle.
//! - [`aws`]: KMS and Secrets Manager adapters for the [`dek`] seams.
//! - [`executable`]: the four operations behind one `invoke` entry point.
//! - [`auth`]: bearer-token gate.
//! - [`server`]: axum router, handlers and listener.

pub mod auth;
pub mod aws;
pub mod config;
pub mod crypto;
pub mod dek;
pub mod executable;
pub mod server;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testutil;
