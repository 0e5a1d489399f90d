//! HTTP surface: routing, the authorization layer, and the listener.
//!
//! # Responsibilities
//! - Expose one `POST` route per operation of the active profile.
//! - Put the bearer-token gate in front of those routes in the full profile.
//! - Relay request bodies to the [`Executable`](crate::executable::Executable)
//!   and its responses back, unmodified.
//! - Serve plain HTTP or terminate TLS with rustls.

pub mod handlers;
pub mod listener;
pub mod middleware;
pub mod router;
pub mod state;
pub mod tls;
