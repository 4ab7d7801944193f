//! Object storage abstraction traits
//!
//! Defines the two whole-file operations the pipeline needs.
//! Implementations can be swapped between S3 and a local directory.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

/// Failure kinds reported by an object store
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object s3://{bucket}/{key} not found")]
    ObjectNotFound { bucket: String, key: String },

    #[error("access denied to s3://{bucket}/{key}")]
    AccessDenied { bucket: String, key: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object storage trait
/// Implementations must be thread-safe and async-compatible
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Download one object, overwriting `local_path`
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError>;

    /// Upload one local file as one object
    async fn publish(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StorageError>;
}
