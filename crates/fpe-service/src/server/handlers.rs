//! Axum request handlers.

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, HealthResponse, Invocation};
use common::Operation;
use tracing::debug;

use super::state::{AppState, Gate};

/// `POST /<operation>`: hand the raw body to the executable and relay its
/// answer. The payload is neither inspected nor transformed here.
pub async fn forward(state: AppState, operation: Operation, body: Bytes) -> Response {
    debug!(operation = %operation, bytes = body.len(), "forwarding to executable");
    let output = state.executable.invoke(Invocation { operation, body }).await;
    let status = StatusCode::from_u16(output.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        output.body,
    )
        .into_response()
}

/// `GET /health`.
///
/// Returns `503 Service Unavailable` when the bearer gate has no signing keys,
/// since every protected request would be denied.
pub async fn health(State(state): State<AppState>) -> Response {
    let signing_keys_loaded = match &state.gate {
        Gate::Open => 0,
        Gate::Bearer(authorizer) => authorizer.keys().len(),
    };
    let ready = matches!(state.gate, Gate::Open) || signing_keys_loaded > 0;

    let (status_code, status_str) = if ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        profile: state.profile,
        signing_keys_loaded,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
