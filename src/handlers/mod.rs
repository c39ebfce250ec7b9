//! HTTP handlers.

pub mod asset;
