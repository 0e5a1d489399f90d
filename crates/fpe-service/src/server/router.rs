//! Axum router construction.

use axum::{
    body::Bytes,
    extract::State,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::{
    handlers, middleware,
    state::{AppState, Gate},
};
use crate::auth::require_bearer;

/// Build the application [`Router`] with all routes and middleware attached.
///
/// The bearer gate is a route layer on the operation routes only, so
/// `/health`, the 404 fallback and CORS preflights stay reachable. No layer
/// re-encodes bodies: callers get the executable's bytes as produced.
pub fn build(state: AppState) -> Router {
    let mut operations = Router::new();
    for &op in state.profile.operations() {
        operations = operations.route(
            op.path(),
            post(move |State(state): State<AppState>, body: Bytes| {
                handlers::forward(state, op, body)
            }),
        );
    }
    if let Gate::Bearer(authorizer) = &state.gate {
        operations = operations.route_layer(from_fn_with_state(authorizer.clone(), require_bearer));
    }

    Router::new()
        .merge(operations)
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(middleware::REQUEST_TIMEOUT))
        .layer(middleware::cors_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, HeaderName, HeaderValue, Request, StatusCode},
    };
    use axum_test::TestServer;
    use common::protocol::{ErrorResponse, FpeResponse, Invocation, InvocationOutput};
    use common::Operation;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::executable::Executable;
    use crate::testutil;

    /// Echoes the request body back and counts invocations.
    #[derive(Default)]
    struct CountingExecutable {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Executable for CountingExecutable {
        async fn invoke(&self, invocation: Invocation) -> InvocationOutput {
            self.calls.fetch_add(1, Ordering::SeqCst);
            InvocationOutput {
                status: 202,
                body: invocation.body,
            }
        }
    }

    fn gated(exe: Arc<CountingExecutable>) -> Router {
        build(AppState::full(exe, testutil::authorizer()))
    }

    fn post_to(path: &str, auth: Option<&str>, body: &'static str) -> Request<Body> {
        let mut req = Request::builder().method("POST").uri(path);
        if let Some(auth) = auth {
            req = req.header(header::AUTHORIZATION, auth);
        }
        req.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = gated(Arc::default());
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn every_protected_route_denies_without_token() {
        let exe = Arc::new(CountingExecutable::default());
        for op in Operation::ALL {
            for auth in [None, Some("Bearer garbage"), Some("Basic Zm9vOmJhcg==")] {
                let resp = gated(exe.clone())
                    .oneshot(post_to(op.path(), auth, r#"{"input":"123456789"}"#))
                    .await
                    .unwrap();
                assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{op} {auth:?}");
                assert_eq!(resp.headers()[header::WWW_AUTHENTICATE], "Bearer");
            }
        }
        assert_eq!(exe.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn authorized_request_is_passed_through_unmodified() {
        let exe = Arc::new(CountingExecutable::default());
        let bearer = testutil::bearer();
        let raw = r#"{ "input" : "123456789",   "radix":10 }"#;
        let resp = gated(exe.clone())
            .oneshot(post_to("/envelope-encrypt", Some(&bearer), raw))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], raw.as_bytes());
        assert_eq!(exe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn response_is_not_re_encoded_when_client_accepts_gzip() {
        let exe = Arc::new(CountingExecutable::default());
        let raw = r#"{"input":"123456789012345678901234567890123456789012345678901234567890"}"#;
        let req = Request::builder()
            .method("POST")
            .uri("/envelope-encrypt")
            .header(header::AUTHORIZATION, testutil::bearer())
            .header(header::ACCEPT_ENCODING, "gzip, br")
            .body(Body::from(raw))
            .unwrap();
        let resp = gated(exe).oneshot(req).await.unwrap();

        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert!(resp.headers().get(header::CONTENT_ENCODING).is_none());
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], raw.as_bytes());
    }

    #[tokio::test]
    async fn health_is_not_gated() {
        let resp = gated(Arc::default())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn operation_routes_accept_only_post() {
        let bearer = testutil::bearer();
        let req = Request::builder()
            .method("GET")
            .uri("/encrypt")
            .header(header::AUTHORIZATION, bearer)
            .body(Body::empty())
            .unwrap();
        let resp = gated(Arc::default()).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn cors_preflight_allows_post_from_any_origin() {
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/encrypt")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization,x-api-key")
            .body(Body::empty())
            .unwrap();
        let resp = gated(Arc::default()).oneshot(req).await.unwrap();
        assert!(resp.status().is_success());
        let headers = resp.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert!(headers[header::ACCESS_CONTROL_ALLOW_METHODS]
            .to_str()
            .unwrap()
            .contains("POST"));
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS]
            .to_str()
            .unwrap()
            .to_ascii_lowercase();
        for h in ["content-type", "x-amz-date", "authorization", "x-api-key"] {
            assert!(allowed.contains(h), "{h} missing from {allowed}");
        }
    }

    #[tokio::test]
    async fn minimal_profile_serves_two_open_routes() {
        let exe = Arc::new(CountingExecutable::default());
        let app = build(AppState::minimal(exe.clone()));

        let ok = app
            .clone()
            .oneshot(post_to("/encrypt", None, r#"{"input":"1"}"#))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::ACCEPTED);

        let missing = app
            .oneshot(post_to("/envelope-encrypt", None, r#"{"input":"1"}"#))
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(exe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn end_to_end_envelope_round_trip() {
        let (exe, _) = testutil::full_pseudonymizer();
        let server =
            TestServer::new(build(AppState::full(Arc::new(exe), testutil::authorizer()))).unwrap();
        let auth = HeaderValue::from_str(&testutil::bearer()).unwrap();

        let enc: FpeResponse = server
            .post("/envelope-encrypt")
            .add_header(HeaderName::from_static("authorization"), auth.clone())
            .json(&json!({"input": "jane@example.com"}))
            .expect_success()
            .await
            .json();
        assert_eq!(enc.radix, -1);

        let dec: FpeResponse = server
            .post("/envelope-decrypt")
            .add_header(HeaderName::from_static("authorization"), auth)
            .json(&json!({"input": enc.ciphertext}))
            .expect_success()
            .await
            .json();
        assert_eq!(dec.plaintext, "jane@example.com");
    }

    #[tokio::test]
    async fn end_to_end_denial_carries_json_error() {
        let (exe, _) = testutil::full_pseudonymizer();
        let server =
            TestServer::new(build(AppState::full(Arc::new(exe), testutil::authorizer()))).unwrap();

        let resp = server
            .post("/encrypt")
            .json(&json!({"input": "123456789"}))
            .expect_failure()
            .await;
        assert_eq!(resp.status_code(), StatusCode::UNAUTHORIZED);
        let err: ErrorResponse = resp.json();
        assert_eq!(err.code, "unauthorized");
    }
}
