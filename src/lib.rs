//! assetgate library — HTTP delivery of objects from an S3-compatible bucket.
//!
//! This crate provides the asset request pipeline (key validation, prefix
//! allow-listing, cache policy, conditional GET and single byte ranges),
//! the object store abstraction with S3 and in-memory implementations,
//! and the axum server that exposes them.

use std::sync::Arc;

pub mod asset;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod server;
pub mod storage;

use crate::asset::pipeline::AssetPipeline;
use crate::config::Config;
use crate::storage::backend::ObjectStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Asset pipeline bound to the configured bucket and object store.
    pub pipeline: AssetPipeline,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn ObjectStore>) -> Self {
        let pipeline = AssetPipeline::new(config.asset_settings(), store);
        Self { config, pipeline }
    }
}
