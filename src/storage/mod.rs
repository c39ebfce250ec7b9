//! Object storage backends.
//!
//! The [`backend::ObjectStore`] trait abstracts over where asset bytes
//! live.  [`s3::S3ObjectStore`] talks to any S3-compatible service (MinIO,
//! AWS); [`memory::MemoryObjectStore`] keeps objects in process.

pub mod backend;
pub mod memory;
pub mod s3;
