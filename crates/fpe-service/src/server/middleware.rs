//! Tower layers applied to the router.
//!
//! Includes request timeout and the CORS policy.

use std::time::Duration;

use axum::http::{HeaderName, Method};
use common::routes::cors;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// `POST` from any origin with the fixed header allow-list.
///
/// Only suitable for trusted-client deployments.
pub fn cors_layer() -> CorsLayer {
    let headers: Vec<HeaderName> = cors::ALLOWED_HEADERS
        .iter()
        .filter_map(|h| match HeaderName::from_bytes(h.as_bytes()) {
            Ok(name) => Some(name),
            Err(_) => {
                warn!(header = %h, "ignoring invalid CORS header name");
                None
            }
        })
        .collect();
    let methods: Vec<Method> = cors::ALLOWED_METHODS
        .iter()
        .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
        .collect();

    let origin = if cors::ALLOWED_ORIGINS.contains(&"*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            cors::ALLOWED_ORIGINS
                .iter()
                .filter_map(|o| o.parse().ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
}
