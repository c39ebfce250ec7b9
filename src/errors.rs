//! Asset request error types.
//!
//! Every variant maps to exactly one HTTP status.  The enum implements
//! [`axum::response::IntoResponse`] so the asset handler can simply return
//! `Err(AssetError::Forbidden(..))` and let axum render it.
//!
//! Response bodies are short, fixed strings.  Backend failures carry the
//! underlying error for logging only; its text never reaches the client.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::asset::range::RangeError;

/// Reasons a request path is rejected before any backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadRequestKind {
    /// Nothing left after the routing prefix.
    EmptyKey,
    /// A `.` or `..` segment.
    TraversalSegment,
    /// Two adjacent slashes or a trailing slash.
    EmptySegment,
    /// A backslash anywhere in the key.
    BackslashInKey,
    /// The key starts with `/`.
    LeadingSlash,
    /// The path does not start with the asset routing prefix.
    MissingPrefix,
    /// Percent-decoding produced invalid UTF-8.
    InvalidEncoding,
}

/// Reasons an otherwise valid key is refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenKind {
    PrefixNotAllowed,
}

/// Reasons the object is reported as missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    NoSuchObject,
    /// The backend has the object but reports a size of zero.
    ZeroSizeObject,
}

/// Which backend call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    StatFailed,
    FetchFailed,
}

/// Every way a single asset request can fail.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("invalid asset key ({0:?})")]
    BadRequest(BadRequestKind),

    #[error("asset key not allowed")]
    Forbidden(ForbiddenKind),

    #[error("asset not found ({0:?})")]
    NotFound(NotFoundKind),

    /// The Range header could not be satisfied against an object of `size` bytes.
    #[error("invalid range: {kind}")]
    RangeNotSatisfiable { kind: RangeError, size: u64 },

    #[error("backend failure ({kind:?}): {source}")]
    Backend {
        kind: BackendErrorKind,
        #[source]
        source: anyhow::Error,
    },
}

impl AssetError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AssetError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AssetError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AssetError::Forbidden(_) => StatusCode::FORBIDDEN,
            AssetError::NotFound(_) => StatusCode::NOT_FOUND,
            AssetError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            AssetError::Backend { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short client-facing message.
    pub fn public_message(&self) -> &'static str {
        match self {
            AssetError::MethodNotAllowed => "method not allowed",
            AssetError::BadRequest(BadRequestKind::EmptyKey) => "missing asset key",
            AssetError::BadRequest(BadRequestKind::MissingPrefix) => "invalid asset path",
            AssetError::BadRequest(_) => "invalid asset key",
            AssetError::Forbidden(_) => "asset key not allowed",
            AssetError::NotFound(NotFoundKind::NoSuchObject) => "asset not found",
            AssetError::NotFound(NotFoundKind::ZeroSizeObject) => "asset empty",
            AssetError::RangeNotSatisfiable { .. } => "invalid range",
            AssetError::Backend {
                kind: BackendErrorKind::StatFailed,
                ..
            } => "failed to stat asset",
            AssetError::Backend {
                kind: BackendErrorKind::FetchFailed,
                ..
            } => "failed to fetch asset",
        }
    }

    /// Metric label describing the failure class.
    pub fn outcome(&self) -> &'static str {
        match self {
            AssetError::MethodNotAllowed => "method_not_allowed",
            AssetError::BadRequest(_) => "bad_request",
            AssetError::Forbidden(_) => "forbidden",
            AssetError::NotFound(_) => "not_found",
            AssetError::RangeNotSatisfiable { .. } => "range_not_satisfiable",
            AssetError::Backend { .. } => "backend_error",
        }
    }
}

impl IntoResponse for AssetError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if let AssetError::Backend { kind, source } = &self {
            tracing::error!(?kind, error = %format!("{source:#}"), "asset backend failure");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "asset request rejected");
        }

        let mut response = (status, format!("{}\n", self.public_message())).into_response();
        let hdrs = response.headers_mut();
        hdrs.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        hdrs.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        match &self {
            AssetError::MethodNotAllowed => {
                hdrs.insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
            }
            AssetError::RangeNotSatisfiable { size, .. } => {
                hdrs.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
                if let Ok(val) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    hdrs.insert(header::CONTENT_RANGE, val);
                }
            }
            _ => {}
        }

        response
    }
}

// -- Tests --------------------------------------------------------------------
