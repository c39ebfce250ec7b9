//! Axum router construction.
//!
//! The [`app`] function wires the asset route, the liveness probe, the ping
//! placeholder and (optionally) `/metrics`, and wraps them in the
//! middleware stack.  Every method on the asset route reaches the asset
//! handler so that unsupported methods get a 405 from the pipeline.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::asset::key::ASSET_ROUTE_PREFIX;
use crate::errors::AssetError;
use crate::handlers::asset::serve_asset;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::AppState;

/// Request id header, echoed when the client supplies one.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes)
}

/// Build the axum [`Router`] with every route and middleware.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router = Router::new()
        // Liveness probe.
        .route("/healthz", get(healthz))
        // Placeholder for a future API namespace.
        .route("/api/v1/ping", get(ping))
        // Wildcard key captures slashes; `/assets/` itself lands in the fallback.
        .route("/assets/*key", any(handle_asset));

    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .fallback(handle_fallback)
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        // Panics become 500s inside the trace span.
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
            let request_id = req
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %req.method(),
                path = %req.uri().path(),
                request_id = %request_id,
                client_ip = %client_ip(req.headers()),
            )
        }))
        // Request id must be assigned before the trace span is created.
        .layer(middleware::from_fn(common_headers_middleware))
        // metrics_middleware is outermost (captures full request lifecycle).
        .layer(middleware::from_fn(metrics_middleware))
}

// -- Common headers middleware -----------------------------------------------

/// Assigns a request id (keeping a sane client-supplied one), echoes it on
/// the response and strips any `Server` header.
async fn common_headers_middleware(mut req: Request<Body>, next: Next) -> Response {
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(generate_request_id);
    let request_id = HeaderValue::from_str(&request_id)
        .unwrap_or_else(|_| HeaderValue::from_static("invalid"));

    req.headers_mut()
        .insert(REQUEST_ID_HEADER, request_id.clone());

    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.remove(header::SERVER);
    headers.insert(REQUEST_ID_HEADER, request_id);
    response
}

/// Client address as reported by a fronting proxy.
fn client_ip(headers: &HeaderMap) -> String {
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let forwarded = || {
        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    real_ip.or_else(forwarded).unwrap_or("-").to_string()
}

// -- Fixed routes --------------------------------------------------------------

/// `GET /healthz` -- plain `ok`.
async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        "ok\n",
    )
}

/// `GET /api/v1/ping` -- `{"ok":true}`.
async fn ping() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json; charset=utf-8")],
        r#"{"ok":true}"#,
    )
}

// -- Asset dispatch ------------------------------------------------------------

/// `ANY /assets/*key`
async fn handle_asset(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AssetError> {
    serve_asset(state, &method, &uri, &headers).await
}

/// Paths no route matched.  `/assets/` with an empty key still belongs to the
/// asset pipeline so it answers 400 rather than 404.
async fn handle_fallback(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Result<Response, AssetError> {
    if uri.path().starts_with(ASSET_ROUTE_PREFIX) {
        serve_asset(state, &method, &uri, &headers).await
    } else {
        Ok((StatusCode::NOT_FOUND, "404 page not found\n").into_response())
    }
}

// -- Tests --------------------------------------------------------------------
