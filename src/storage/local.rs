//! Local directory object store
//!
//! Maps `bucket/key` onto `<root>/<bucket>/<key>`. Used for development
//! and tests where no S3 endpoint is available.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::traits::{ObjectStore, StorageError};

/// Filesystem-backed object store
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve an object path, refusing anything that escapes the root
    pub fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let denied = || StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        };

        let relative = Path::new(bucket).join(key);
        let escapes = bucket.is_empty()
            || key.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(denied());
        }

        Ok(self.root.join(relative))
    }

    fn map_io(err: std::io::Error, bucket: &str, key: &str) -> StorageError {
        match err.kind() {
            ErrorKind::NotFound => StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            ErrorKind::PermissionDenied => StorageError::AccessDenied {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => StorageError::Io(err),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let source = self.object_path(bucket, key)?;
        debug!("Copying {:?} to {:?}", source, local_path);

        tokio::fs::copy(&source, local_path)
            .await
            .map_err(|e| Self::map_io(e, bucket, key))?;
        Ok(())
    }

    async fn publish(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StorageError> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::map_io(e, bucket, key))?;
        }
        debug!("Copying {:?} to {:?}", local_path, target);

        tokio::fs::copy(local_path, &target)
            .await
            .map_err(|e| Self::map_io(e, bucket, key))?;
        Ok(())
    }
}
