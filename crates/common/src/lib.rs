//! Common types, route table, protocol definitions, and errors shared across
//! the FPE pseudonymization crates.

pub mod error;
pub mod protocol;
pub mod routes;

pub use error::ServiceError;
pub use routes::{Operation, Profile};
