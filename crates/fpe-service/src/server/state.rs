//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use common::Profile;

use crate::auth::Authorizer;
use crate::executable::Executable;

/// What stands between a caller and the operation routes.
#[derive(Clone)]
pub enum Gate {
    /// Minimal profile: routes are unauthenticated.
    Open,
    /// Full profile: a verified bearer token is required.
    Bearer(Authorizer),
}

/// Application state shared across all request handlers.
///
/// Every field is cheap to clone, so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    pub executable: Arc<dyn Executable>,
    pub gate: Gate,
    pub profile: Profile,
}

impl AppState {
    /// Four operation routes behind the bearer gate.
    pub fn full(executable: Arc<dyn Executable>, authorizer: Authorizer) -> Self {
        Self {
            executable,
            gate: Gate::Bearer(authorizer),
            profile: Profile::Full,
        }
    }

    /// Two unauthenticated FF1 routes.
    pub fn minimal(executable: Arc<dyn Executable>) -> Self {
        Self {
            executable,
            gate: Gate::Open,
            profile: Profile::Minimal,
        }
    }
}
