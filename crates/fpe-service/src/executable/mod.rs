//! The pseudonymization executable.
//!
//! The router treats an [`Executable`] as opaque: it hands over the operation
//! and the raw request body, and relays whatever comes back. Every invocation
//! is an independent unit of work; nothing is cached between invocations.

pub mod pseudonymizer;

pub use pseudonymizer::{ExecutableSettings, KeySource, Pseudonymizer, StaticKey};

use async_trait::async_trait;
use common::protocol::{Invocation, InvocationOutput};

/// A unit that turns one [`Invocation`] into one [`InvocationOutput`].
///
/// Failures are encoded in the output's status and body rather than returned
/// as `Err`, so the caller can pass them through unmodified.
#[async_trait]
pub trait Executable: Send + Sync {
    async fn invoke(&self, invocation: Invocation) -> InvocationOutput;
}
