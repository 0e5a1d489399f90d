//! The forward stage: run the decision, then hand the request on untouched.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use common::{protocol::ErrorResponse, ServiceError};
use tracing::{debug, info};

use super::{Authorizer, AuthorizerDecision};

/// Reject the request with 401 unless [`Authorizer::decide`] allows it.
///
/// On success the [`Principal`](super::Principal) is stored in the request
/// extensions. The body is never read here.
pub async fn require_bearer(
    State(authorizer): State<Authorizer>,
    mut req: Request,
    next: Next,
) -> Response {
    let authorization = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match authorizer.decide(authorization) {
        AuthorizerDecision::Allow(principal) => {
            debug!(client_id = %principal.client_id, "request authorized");
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        AuthorizerDecision::Deny(reason) => {
            info!(reason = %reason, path = %req.uri().path(), "request denied");
            unauthorized()
        }
    }
}

fn unauthorized() -> Response {
    let err = ServiceError::Unauthorized("Unauthorized".into());
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ErrorResponse::from(&err)),
    )
        .into_response()
}
