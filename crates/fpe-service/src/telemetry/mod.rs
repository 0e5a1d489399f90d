//! Structured logging and optional OTLP span export.
//!
//! # Telemetry invariants
//!
//! - **No plaintexts, ciphertexts or key material** in any span attribute or
//!   log field. Invocations are identified by a random id only.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), and
//!   `RUST_LOG` overrides it.

pub mod init;

pub use init::{init_telemetry, shutdown_telemetry};
