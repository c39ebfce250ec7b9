//! Prometheus metrics for assetgate.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::asset::key::ASSET_ROUTE_PREFIX;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "assetgate_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "assetgate_http_request_duration_seconds";

/// Asset pipeline outcomes (counter). Labels: outcome.
pub const ASSET_RESPONSES_TOTAL: &str = "assetgate_asset_responses_total";

/// Body bytes planned for GET responses (counter).
pub const ASSET_BYTES_PLANNED_TOTAL: &str = "assetgate_asset_bytes_planned_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder.  Calling it again returns the
/// already installed handle.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(ASSET_RESPONSES_TOTAL, "Asset requests by outcome");
    describe_counter!(
        ASSET_BYTES_PLANNED_TOTAL,
        "Body bytes planned for asset responses"
    );
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to a bounded route label.
///
/// - `/healthz`, `/api/v1/ping`, `/metrics` -> unchanged
/// - `/assets/...` -> `/assets/{key}`
/// - anything else -> `other`
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/healthz" => "/healthz",
        "/api/v1/ping" => "/api/v1/ping",
        "/metrics" => "/metrics",
        p if p.starts_with(ASSET_ROUTE_PREFIX) => "/assets/{key}",
        _ => "other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled\n").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
