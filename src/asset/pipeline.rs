//! Asset request pipeline.
//!
//! Turns a GET/HEAD request plus backend metadata into a [`ResponsePlan`]
//! and, for GET, an open body stream.  Steps run in a fixed order and the
//! first failure ends the request:
//!
//! 1. method check (GET/HEAD only)
//! 2. key validation and prefix authorization (no backend call yet)
//! 3. `stat` against the object store
//! 4. Cache-Control selection
//! 5. `If-None-Match` (a match returns 304 before the Range header is read)
//! 6. Range parsing
//! 7. `get` for the full object or the window (skipped for HEAD)

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use tracing::{debug, warn};

use crate::asset::conditional::{self, Conditional};
use crate::asset::key::{validate_asset_path, ObjectKey};
use crate::asset::range::{parse_single_range, ByteRange, RangeError};
use crate::config::AssetSettings;
use crate::errors::{AssetError, BackendErrorKind, NotFoundKind};
use crate::storage::backend::{ObjectBody, ObjectMetadata, ObjectStore, StoreError};

const OCTET_STREAM: &str = "application/octet-stream";

/// Status, headers and body framing for one asset response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponsePlan {
    pub status: StatusCode,
    /// Response headers in emission order.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Byte window for a 206 response.
    pub body_window: Option<ByteRange>,
    /// No body bytes are sent (HEAD and 304).
    pub suppress_body: bool,
    /// Bytes the body will carry when not suppressed.
    pub content_length: u64,
}

impl ResponsePlan {
    fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body_window: None,
            suppress_body: false,
            content_length: 0,
        }
    }

    fn push(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.push((name, value));
    }

    /// Push a header built from dynamic text, skipping values HTTP cannot carry.
    fn push_str(&mut self, name: HeaderName, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(v) => self.push(name, v),
            Err(_) => warn!(header = %name, "dropping header with invalid value"),
        }
    }

    /// First value for `name`, if planned.
    pub fn header(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.headers.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// A planned response plus the backend stream feeding it, if any.
pub struct AssetResponse {
    pub key: ObjectKey,
    pub plan: ResponsePlan,
    /// Present only when the plan carries a body.
    pub body: Option<ObjectBody>,
}

/// The asset pipeline.  One instance serves every request.
pub struct AssetPipeline {
    settings: AssetSettings,
    store: Arc<dyn ObjectStore>,
}

impl AssetPipeline {
    pub fn new(settings: AssetSettings, store: Arc<dyn ObjectStore>) -> Self {
        Self { settings, store }
    }

    /// Run the full pipeline for a request whose path is already percent-decoded.
    pub async fn handle(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<AssetResponse, AssetError> {
        let (key, plan) = self.plan(method, path, headers).await?;
        let body = if plan.suppress_body {
            None
        } else {
            Some(self.open(&key, plan.body_window).await?)
        };
        Ok(AssetResponse { key, plan, body })
    }

    /// Every decision short of opening the object stream.
    pub async fn plan(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<(ObjectKey, ResponsePlan), AssetError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(AssetError::MethodNotAllowed);
        }
        let is_head = method == Method::HEAD;

        let key = validate_asset_path(path).map_err(AssetError::BadRequest)?;
        self.settings
            .authorizer
            .authorize(&key)
            .map_err(AssetError::Forbidden)?;

        let meta = self.resolve(&key).await?;
        let mut plan = ResponsePlan::new(StatusCode::OK);

        let directive = self.settings.cache_policy.select(&key);
        if !directive.value().is_empty() {
            plan.push_str(header::CACHE_CONTROL, directive.value());
        }

        let etag = conditional::strip_etag_quotes(&meta.etag);
        if !etag.is_empty() {
            plan.push_str(header::ETAG, &format!("\"{etag}\""));
            let inm = header_str(headers, &header::IF_NONE_MATCH);
            if conditional::evaluate(inm, &meta.etag) == Conditional::NotModified {
                debug!(key = %key, "asset not modified");
                plan.status = StatusCode::NOT_MODIFIED;
                plan.suppress_body = true;
                return Ok((key, plan));
            }
        }

        if let Some(modified) = meta.last_modified {
            plan.push_str(
                header::LAST_MODIFIED,
                &httpdate::fmt_http_date(modified),
            );
        }

        let content_type = content_type_for(&key, &meta);
        plan.push(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM)),
        );
        plan.push(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        plan.push(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );

        let range_hdr = match headers.get(header::RANGE).map(HeaderValue::to_str) {
            None => None,
            Some(Ok(value)) => Some(value.trim()).filter(|r| !r.is_empty()),
            Some(Err(_)) => {
                return Err(AssetError::RangeNotSatisfiable {
                    kind: RangeError::MalformedSyntax,
                    size: meta.size,
                })
            }
        };
        match range_hdr {
            Some(range_hdr) => {
                let window = parse_single_range(range_hdr, meta.size).map_err(|kind| {
                    AssetError::RangeNotSatisfiable {
                        kind,
                        size: meta.size,
                    }
                })?;
                plan.status = StatusCode::PARTIAL_CONTENT;
                plan.push_str(header::CONTENT_RANGE, &window.content_range(meta.size));
                plan.push(header::CONTENT_LENGTH, HeaderValue::from(window.len()));
                plan.body_window = Some(window);
                plan.content_length = window.len();
            }
            None => {
                plan.push(header::CONTENT_LENGTH, HeaderValue::from(meta.size));
                plan.content_length = meta.size;
            }
        }

        plan.suppress_body = is_head;
        debug!(
            key = %key,
            status = plan.status.as_u16(),
            window = ?plan.body_window,
            head = is_head,
            "asset response planned"
        );
        Ok((key, plan))
    }

    /// `stat` the key; zero-size objects count as missing.
    async fn resolve(&self, key: &ObjectKey) -> Result<ObjectMetadata, AssetError> {
        let meta = self
            .store
            .stat(&self.settings.bucket, key.as_str())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AssetError::NotFound(NotFoundKind::NoSuchObject),
                StoreError::Backend(source) => AssetError::Backend {
                    kind: BackendErrorKind::StatFailed,
                    source,
                },
            })?;
        if meta.size == 0 {
            return Err(AssetError::NotFound(NotFoundKind::ZeroSizeObject));
        }
        Ok(meta)
    }

    /// Open the object stream for the planned window.
    async fn open(
        &self,
        key: &ObjectKey,
        window: Option<ByteRange>,
    ) -> Result<ObjectBody, AssetError> {
        self.store
            .get(&self.settings.bucket, key.as_str(), window)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AssetError::NotFound(NotFoundKind::NoSuchObject),
                StoreError::Backend(source) => AssetError::Backend {
                    kind: BackendErrorKind::FetchFailed,
                    source,
                },
            })
    }
}

/// Trimmed header value; non-UTF-8 values are treated as absent.
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Backend content type, else a guess from the extension, else binary.
fn content_type_for(key: &ObjectKey, meta: &ObjectMetadata) -> String {
    meta.content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(key.file_name())
                .first_or_octet_stream()
                .to_string()
        })
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::cache_control::CachePolicy;
    use crate::asset::key::PrefixAuthorizer;
    use crate::errors::{BadRequestKind, ForbiddenKind};
    use crate::storage::memory::MemoryObjectStore;
    use std::time::{Duration, SystemTime};
    use tokio::io::AsyncReadExt;

    const BUCKET: &str = "lectures";

    fn settings(prefixes: &[&str]) -> AssetSettings {
        AssetSettings {
            bucket: BUCKET.to_string(),
            cache_policy: CachePolicy {
                override_value: String::new(),
                default_value: "public, max-age=3600".to_string(),
                immutable_value: "public, max-age=31536000, immutable".to_string(),
            },
            authorizer: PrefixAuthorizer::new(prefixes),
        }
    }

    async fn pipeline_with(prefixes: &[&str]) -> (AssetPipeline, Arc<MemoryObjectStore>) {
        let store = Arc::new(MemoryObjectStore::new());
        let data: Vec<u8> = (0..100u8).collect();
        store
            .insert_with_metadata(
                BUCKET,
                "docs/data.bin",
                data,
                ObjectMetadata {
                    size: 100,
                    etag: "\"abc123\"".to_string(),
                    last_modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)),
                    content_type: None,
                },
            )
            .await;
        let pipeline = AssetPipeline::new(settings(prefixes), store.clone());
        (pipeline, store)
    }

    async fn pipeline() -> (AssetPipeline, Arc<MemoryObjectStore>) {
        pipeline_with(&[]).await
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.insert(k, HeaderValue::from_static(v));
        }
        map
    }

    async fn read_body(resp: AssetResponse) -> Vec<u8> {
        let mut out = Vec::new();
        resp.body.unwrap().read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_full_get() {
        let (p, _) = pipeline().await;
        let resp = p
            .handle(&Method::GET, "/assets/docs/data.bin", &HeaderMap::new())
            .await
            .unwrap();
        let plan = &resp.plan;
        assert_eq!(plan.status, StatusCode::OK);
        assert_eq!(plan.content_length, 100);
        assert!(plan.body_window.is_none());
        assert_eq!(plan.header(&header::ETAG).unwrap(), "\"abc123\"");
        assert_eq!(plan.header(&header::CACHE_CONTROL).unwrap(), "public, max-age=3600");
        assert_eq!(plan.header(&header::CONTENT_LENGTH).unwrap(), "100");
        assert_eq!(plan.header(&header::ACCEPT_RANGES).unwrap(), "bytes");
        assert_eq!(plan.header(&header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(
            plan.header(&header::CONTENT_TYPE).unwrap(),
            "application/octet-stream"
        );
        assert_eq!(
            plan.header(&header::LAST_MODIFIED).unwrap(),
            "Tue, 14 Nov 2023 22:13:20 GMT"
        );
        assert!(plan.header(&header::CONTENT_RANGE).is_none());
        assert_eq!(read_body(resp).await, (0..100u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_header_order() {
        let (p, _) = pipeline().await;
        let (_, plan) = p
            .plan(&Method::GET, "/assets/docs/data.bin", &headers(&[("range", "bytes=0-0")]))
            .await
            .unwrap();
        let names: Vec<_> = plan.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            [
                "cache-control",
                "etag",
                "last-modified",
                "content-type",
                "accept-ranges",
                "x-content-type-options",
                "content-range",
                "content-length"
            ]
        );
    }

    #[tokio::test]
    async fn test_range_get() {
        let (p, _) = pipeline().await;
        let resp = p
            .handle(
                &Method::GET,
                "/assets/docs/data.bin",
                &headers(&[("range", "bytes=50-200")]),
            )
            .await
            .unwrap();
        assert_eq!(resp.plan.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(resp.plan.body_window, Some(ByteRange { start: 50, end: 99 }));
        assert_eq!(
            resp.plan.header(&header::CONTENT_RANGE).unwrap(),
            "bytes 50-99/100"
        );
        assert_eq!(resp.plan.header(&header::CONTENT_LENGTH).unwrap(), "50");
        assert_eq!(read_body(resp).await, (50..100u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_suffix_range_get() {
        let (p, _) = pipeline().await;
        let resp = p
            .handle(
                &Method::GET,
                "/assets/docs/data.bin",
                &headers(&[("range", "bytes=-10")]),
            )
            .await
            .unwrap();
        assert_eq!(resp.plan.body_window, Some(ByteRange { start: 90, end: 99 }));
        assert_eq!(read_body(resp).await, (90..100u8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unsatisfiable_ranges() {
        let (p, _) = pipeline().await;
        for (range, want) in [
            ("bytes=200-300", RangeError::OutOfBoundsStart),
            ("bytes=0-1,2-3", RangeError::MultiRangeUnsupported),
            ("items=0-1", RangeError::MalformedSyntax),
        ] {
            let mut hdrs = HeaderMap::new();
            hdrs.insert("range", HeaderValue::from_static(range));
            match p.handle(&Method::GET, "/assets/docs/data.bin", &hdrs).await {
                Err(AssetError::RangeNotSatisfiable { kind, size }) => {
                    assert_eq!(kind, want, "range: {range}");
                    assert_eq!(size, 100);
                }
                other => panic!("expected 416 for {range}, got {:?}", other.map(|r| r.plan)),
            }
        }
    }

    #[tokio::test]
    async fn test_opaque_range_header_is_unsatisfiable() {
        let (p, _) = pipeline().await;
        let mut hdrs = HeaderMap::new();
        hdrs.insert(
            header::RANGE,
            HeaderValue::from_bytes(b"bytes=0-1\xff").unwrap(),
        );
        match p.plan(&Method::GET, "/assets/docs/data.bin", &hdrs).await {
            Err(AssetError::RangeNotSatisfiable { kind, size }) => {
                assert_eq!(kind, RangeError::MalformedSyntax);
                assert_eq!(size, 100);
            }
            other => panic!("expected 416, got {:?}", other.map(|(_, plan)| plan)),
        }
    }

    #[tokio::test]
    async fn test_blank_range_header_is_ignored() {
        let (p, _) = pipeline().await;
        let (_, plan) = p
            .plan(&Method::GET, "/assets/docs/data.bin", &headers(&[("range", "  ")]))
            .await
            .unwrap();
        assert_eq!(plan.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_if_none_match_short_circuits_before_range() {
        let (p, _) = pipeline().await;
        let resp = p
            .handle(
                &Method::GET,
                "/assets/docs/data.bin",
                &headers(&[("if-none-match", "\"abc123\""), ("range", "bytes=0-1,2-3")]),
            )
            .await
            .unwrap();
        assert_eq!(resp.plan.status, StatusCode::NOT_MODIFIED);
        assert!(resp.plan.suppress_body);
        assert!(resp.body.is_none());
        assert!(resp.plan.header(&header::CONTENT_RANGE).is_none());
        assert!(resp.plan.header(&header::CONTENT_LENGTH).is_none());
        assert_eq!(resp.plan.header(&header::ETAG).unwrap(), "\"abc123\"");
        assert!(resp.plan.header(&header::CACHE_CONTROL).is_some());
    }

    #[tokio::test]
    async fn test_if_none_match_mismatch_serves_range() {
        let (p, _) = pipeline().await;
        let (_, plan) = p
            .plan(
                &Method::GET,
                "/assets/docs/data.bin",
                &headers(&[("if-none-match", "\"stale\""), ("range", "bytes=0-0")]),
            )
            .await
            .unwrap();
        assert_eq!(plan.status, StatusCode::PARTIAL_CONTENT);
    }

    #[tokio::test]
    async fn test_empty_etag_disables_conditional() {
        let (p, store) = pipeline().await;
        store
            .insert(BUCKET, "noetag.txt", "hello", "", Some("text/plain"))
            .await;
        let (_, plan) = p
            .plan(&Method::GET, "/assets/noetag.txt", &headers(&[("if-none-match", "\"\"")]))
            .await
            .unwrap();
        assert_eq!(plan.status, StatusCode::OK);
        assert!(plan.header(&header::ETAG).is_none());
        assert_eq!(plan.header(&header::CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn test_unquoted_backend_etag_is_quoted() {
        let (p, store) = pipeline().await;
        store.insert(BUCKET, "a.txt", "hello", "deadbeef", None).await;
        let (_, plan) = p
            .plan(&Method::GET, "/assets/a.txt", &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(plan.header(&header::ETAG).unwrap(), "\"deadbeef\"");
    }

    #[tokio::test]
    async fn test_head_suppresses_body_and_skips_fetch() {
        let (p, _) = pipeline().await;
        let resp = p
            .handle(
                &Method::HEAD,
                "/assets/docs/data.bin",
                &headers(&[("range", "bytes=10-")]),
            )
            .await
            .unwrap();
        assert_eq!(resp.plan.status, StatusCode::PARTIAL_CONTENT);
        assert!(resp.plan.suppress_body);
        assert!(resp.body.is_none());
        assert_eq!(
            resp.plan.header(&header::CONTENT_RANGE).unwrap(),
            "bytes 10-99/100"
        );
        assert_eq!(resp.plan.header(&header::CONTENT_LENGTH).unwrap(), "90");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let (p, _) = pipeline().await;
        for method in [Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS] {
            let err = p
                .handle(&method, "/assets/docs/data.bin", &HeaderMap::new())
                .await
                .err()
                .unwrap();
            assert!(matches!(err, AssetError::MethodNotAllowed));
        }
    }

    #[tokio::test]
    async fn test_bad_keys_fail_before_backend() {
        let (p, store) = pipeline().await;
        store.fail_key(BUCKET, "docs/data.bin").await;
        for (path, want) in [
            ("/assets/", BadRequestKind::EmptyKey),
            ("/assets/docs/../data.bin", BadRequestKind::TraversalSegment),
            ("/assets/docs//data.bin", BadRequestKind::EmptySegment),
            ("/assets/docs\\data.bin", BadRequestKind::BackslashInKey),
            ("/assets//docs/data.bin", BadRequestKind::LeadingSlash),
            ("/files/docs/data.bin", BadRequestKind::MissingPrefix),
        ] {
            match p.handle(&Method::GET, path, &HeaderMap::new()).await {
                Err(AssetError::BadRequest(kind)) => assert_eq!(kind, want, "path: {path}"),
                other => panic!("expected 400 for {path}, got {:?}", other.map(|r| r.plan)),
            }
        }
    }

    #[tokio::test]
    async fn test_prefix_not_allowed() {
        let (p, store) = pipeline_with(&["public/"]).await;
        store.fail_key(BUCKET, "docs/data.bin").await;
        let err = p
            .handle(&Method::GET, "/assets/docs/data.bin", &HeaderMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AssetError::Forbidden(ForbiddenKind::PrefixNotAllowed)
        ));
    }

    #[tokio::test]
    async fn test_not_found_and_zero_size() {
        let (p, store) = pipeline().await;
        let err = p
            .handle(&Method::GET, "/assets/missing.pdf", &HeaderMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AssetError::NotFound(NotFoundKind::NoSuchObject)));

        store.insert(BUCKET, "empty.txt", "", "\"e\"", None).await;
        let err = p
            .handle(&Method::GET, "/assets/empty.txt", &HeaderMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AssetError::NotFound(NotFoundKind::ZeroSizeObject)));
    }

    #[tokio::test]
    async fn test_stat_failure_is_backend_error() {
        let (p, store) = pipeline().await;
        store.fail_key(BUCKET, "docs/data.bin").await;
        let err = p
            .handle(&Method::GET, "/assets/docs/data.bin", &HeaderMap::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            AssetError::Backend {
                kind: BackendErrorKind::StatFailed,
                ..
            }
        ));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_object_vanishing_after_stat_is_not_found() {
        let (p, store) = pipeline().await;
        let (key, plan) = p
            .plan(&Method::GET, "/assets/docs/data.bin", &HeaderMap::new())
            .await
            .unwrap();
        store.remove(BUCKET, "docs/data.bin").await;
        let err = p.open(&key, plan.body_window).await.err().unwrap();
        assert!(matches!(err, AssetError::NotFound(NotFoundKind::NoSuchObject)));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_backend_error() {
        let (p, store) = pipeline().await;
        let (key, plan) = p
            .plan(&Method::GET, "/assets/docs/data.bin", &HeaderMap::new())
            .await
            .unwrap();
        store.fail_key(BUCKET, "docs/data.bin").await;
        let err = p.open(&key, plan.body_window).await.err().unwrap();
        assert!(matches!(
            err,
            AssetError::Backend {
                kind: BackendErrorKind::FetchFailed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_content_type_guess_and_immutable_cache() {
        let (p, store) = pipeline().await;
        store
            .insert(BUCKET, "slides/report.v20250101T000000Z.pdf", "%PDF-1.7", "\"e\"", None)
            .await;
        let (_, plan) = p
            .plan(
                &Method::GET,
                "/assets/slides/report.v20250101T000000Z.pdf",
                &HeaderMap::new(),
            )
            .await
            .unwrap();
        assert_eq!(plan.header(&header::CONTENT_TYPE).unwrap(), "application/pdf");
        assert_eq!(
            plan.header(&header::CACHE_CONTROL).unwrap(),
            "public, max-age=31536000, immutable"
        );
    }
}
