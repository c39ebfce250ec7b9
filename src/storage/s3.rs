//! S3-compatible object store backend.
//!
//! Works against MinIO and AWS S3 alike: requests use path-style
//! addressing, a fixed endpoint URL and static credentials taken from the
//! configuration.  Ranged reads are pushed down to the service as a
//! `Range: bytes=<start>-<end>` request header so only the window crosses
//! the network.

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::Client;
use std::time::SystemTime;
use tracing::{debug, info};

use super::backend::{ObjectBody, ObjectMetadata, ObjectStore, StoreError, StoreFuture};
use crate::asset::range::ByteRange;
use crate::config::StorageConfig;

/// Error codes that mean "no such object" rather than a service failure.
const NOT_FOUND_CODES: &[&str] = &["NoSuchKey", "NoSuchBucket", "NotFound"];

/// Backend that forwards reads to an S3-compatible service.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Build a client from the storage configuration.
    ///
    /// No network traffic happens here; connection problems surface on the
    /// first request.
    pub async fn new(config: &StorageConfig) -> anyhow::Result<Self> {
        let creds = aws_sdk_s3::config::Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "assetgate-config",
        );

        let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(config.endpoint_url())
            .credentials_provider(creds)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build();

        info!(
            "S3 object store initialized: endpoint={} region={} bucket={}",
            config.endpoint_url(),
            config.region,
            config.bucket
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
        })
    }
}

/// Classify an SDK error as not-found or a backend failure.
fn map_sdk_error<E>(context: &str, err: SdkError<E>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let code_not_found = err
        .as_service_error()
        .and_then(|e| e.code())
        .is_some_and(|code| NOT_FOUND_CODES.contains(&code));
    let status_not_found = err
        .raw_response()
        .is_some_and(|r| r.status().as_u16() == 404);

    if code_not_found || status_not_found {
        StoreError::NotFound
    } else {
        StoreError::Backend(anyhow::anyhow!(
            "S3 {context}: {}",
            DisplayErrorContext(&err)
        ))
    }
}

/// `Range` request header value for a window.
fn range_header(range: &ByteRange) -> String {
    format!("bytes={}-{}", range.start, range.end)
}

impl ObjectStore for S3ObjectStore {
    fn stat(&self, bucket: &str, key: &str) -> StoreFuture<'_, ObjectMetadata> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!("S3 head_object: bucket={} key={}", bucket, key);

            let resp = self
                .client
                .head_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| map_sdk_error("head_object", e))?;

            let size = resp.content_length().unwrap_or(0).max(0) as u64;
            let last_modified = resp
                .last_modified()
                .and_then(|dt| SystemTime::try_from(*dt).ok());

            Ok(ObjectMetadata {
                size,
                etag: resp.e_tag().unwrap_or_default().to_string(),
                last_modified,
                content_type: resp.content_type().map(str::to_string),
            })
        })
    }

    fn get(
        &self,
        bucket: &str,
        key: &str,
        range: Option<ByteRange>,
    ) -> StoreFuture<'_, ObjectBody> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move {
            debug!(
                "S3 get_object: bucket={} key={} range={:?}",
                bucket, key, range
            );

            let resp = self
                .client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .set_range(range.as_ref().map(range_header))
                .send()
                .await
                .map_err(|e| map_sdk_error("get_object", e))?;

            let body: ObjectBody = Box::pin(resp.body.into_async_read());
            Ok(body)
        })
    }
}

// -- Tests --------------------------------------------------------------------
