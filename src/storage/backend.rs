//! Abstract object store trait.
//!
//! The asset pipeline talks to the bucket only through [`ObjectStore`]:
//! a metadata lookup and a (possibly windowed) read.  Implementations hand
//! back an opaque async reader so callers never see the underlying client.

use std::future::Future;
use std::pin::Pin;
use std::time::SystemTime;

use thiserror::Error;
use tokio::io::AsyncRead;

use crate::asset::range::ByteRange;

/// Object metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Size in bytes.
    pub size: u64,
    /// Opaque entity tag, possibly quoted.
    pub etag: String,
    pub last_modified: Option<SystemTime>,
    pub content_type: Option<String>,
}

/// Readable object body.  Dropping it releases the backend stream.
pub type ObjectBody = Pin<Box<dyn AsyncRead + Send>>;

/// Failures reported by an [`ObjectStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Read-only object storage contract.
///
/// Implementations must not retry or cache on the caller's behalf.
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch metadata for `key` in `bucket`.
    fn stat(&self, bucket: &str, key: &str) -> StoreFuture<'_, ObjectMetadata>;

    /// Open the object for reading, limited to `range` when given.
    fn get(&self, bucket: &str, key: &str, range: Option<ByteRange>) -> StoreFuture<'_, ObjectBody>;
}
