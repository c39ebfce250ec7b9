//! In-memory object store.
//!
//! Objects live in a `tokio::sync::RwLock<HashMap<...>>` keyed by
//! `bucket/key`.  Individual keys can be marked as failing so callers can
//! exercise backend-error paths without a network.

use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::time::SystemTime;

use super::backend::{ObjectBody, ObjectMetadata, ObjectStore, StoreError, StoreFuture};
use crate::asset::range::ByteRange;

#[derive(Debug, Clone)]
struct StoredAsset {
    data: Bytes,
    metadata: ObjectMetadata,
}

/// In-memory [`ObjectStore`].
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: tokio::sync::RwLock<HashMap<String, StoredAsset>>,
    failing: tokio::sync::RwLock<HashSet<String>>,
}

fn storage_key(bucket: &str, key: &str) -> String {
    format!("{bucket}/{key}")
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `data` with a caller-chosen ETag and optional content type.
    pub async fn insert(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        etag: &str,
        content_type: Option<&str>,
    ) {
        let data = data.into();
        let metadata = ObjectMetadata {
            size: data.len() as u64,
            etag: etag.to_string(),
            last_modified: Some(SystemTime::now()),
            content_type: content_type.map(str::to_string),
        };
        self.insert_with_metadata(bucket, key, data, metadata).await;
    }

    /// Store `data` with explicit metadata.  `metadata.size` is kept as given
    /// so inconsistent backends can be simulated.
    pub async fn insert_with_metadata(
        &self,
        bucket: &str,
        key: &str,
        data: impl Into<Bytes>,
        metadata: ObjectMetadata,
    ) {
        self.objects.write().await.insert(
            storage_key(bucket, key),
            StoredAsset {
                data: data.into(),
                metadata,
            },
        );
    }

    pub async fn remove(&self, bucket: &str, key: &str) {
        self.objects.write().await.remove(&storage_key(bucket, key));
    }

    /// Make every call for `key` fail with a backend error.
    pub async fn fail_key(&self, bucket: &str, key: &str) {
        self.failing.write().await.insert(storage_key(bucket, key));
    }

    async fn lookup(&self, bucket: &str, key: &str) -> Result<StoredAsset, StoreError> {
        let sk = storage_key(bucket, key);
        if self.failing.read().await.contains(&sk) {
            return Err(StoreError::Backend(anyhow::anyhow!(
                "injected failure for {sk}"
            )));
        }
        self.objects
            .read()
            .await
            .get(&sk)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

impl ObjectStore for MemoryObjectStore {
    fn stat(&self, bucket: &str, key: &str) -> StoreFuture<'_, ObjectMetadata> {
        let bucket = bucket.to_string();
        let key = key.to_string();
        Box::pin(async move { Ok(self.lookup(&bucket, &key).await?.metadata) })
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
            let stored = self.lookup(&bucket, &key).await?;
            let data = match range {
                Some(r) => {
                    let len = stored.data.len() as u64;
                    if r.start >= len {
                        Bytes::new()
                    } else {
                        let end = r.end.min(len - 1);
                        stored.data.slice(r.start as usize..=end as usize)
                    }
                }
                None => stored.data,
            };
            let body: ObjectBody = Box::pin(Cursor::new(data));
            Ok(body)
        })
    }
}

// -- Tests --------------------------------------------------------------------
