//! `GET|HEAD /assets/<key>` handler.
//!
//! Decodes the request path, runs the [`AssetPipeline`](crate::asset::pipeline::AssetPipeline)
//! and turns the resulting plan into an axum response.  The backend reader
//! is streamed with `ReaderStream`; when the client goes away hyper drops
//! the body, which drops the reader and releases the backend connection.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Uri};
use axum::response::Response;
use metrics::counter;
use percent_encoding::percent_decode_str;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use crate::asset::pipeline::AssetResponse;
use crate::errors::{AssetError, BadRequestKind};
use crate::metrics::{ASSET_BYTES_PLANNED_TOTAL, ASSET_RESPONSES_TOTAL};
use crate::AppState;

/// Serve one asset request.
pub async fn serve_asset(
    state: Arc<AppState>,
    method: &Method,
    uri: &Uri,
    headers: &HeaderMap,
) -> Result<Response, AssetError> {
    let result = match percent_decode_str(uri.path()).decode_utf8() {
        Ok(path) => state.pipeline.handle(method, &path, headers).await,
        Err(_) => Err(AssetError::BadRequest(BadRequestKind::InvalidEncoding)),
    };

    match result {
        Ok(resp) => {
            let outcome = match resp.plan.status.as_u16() {
                206 => "partial",
                304 => "not_modified",
                _ => "full",
            };
            counter!(ASSET_RESPONSES_TOTAL, "outcome" => outcome).increment(1);
            if resp.body.is_some() {
                counter!(ASSET_BYTES_PLANNED_TOTAL).increment(resp.plan.content_length);
            }
            Ok(into_response(resp))
        }
        Err(err) => {
            counter!(ASSET_RESPONSES_TOTAL, "outcome" => err.outcome()).increment(1);
            Err(err)
        }
    }
}

/// Apply the plan's status and headers and attach the body stream.
fn into_response(resp: AssetResponse) -> Response {
    let AssetResponse { plan, body, .. } = resp;

    let body = match body {
        // The window length bounds the copy even if the backend sends more.
        Some(reader) => Body::from_stream(ReaderStream::new(reader.take(plan.content_length))),
        None => Body::empty(),
    };

    let mut response = Response::new(body);
    *response.status_mut() = plan.status;
    let hdrs = response.headers_mut();
    for (name, value) in plan.headers {
        hdrs.append(name, value);
    }
    response
}
