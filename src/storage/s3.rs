//! S3 object store implementation

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use crate::config::StorageConfig;

use super::traits::{ObjectStore, StorageError};

/// S3-backed object store
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    /// Create a client from the default AWS credential chain
    pub async fn new(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint {
            info!("Using custom S3 endpoint: {}", endpoint);
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

/// Map an S3 error code onto the storage failure kinds
fn classify(code: Option<&str>, message: String, bucket: &str, key: &str) -> StorageError {
    match code {
        Some("NoSuchKey" | "NoSuchBucket" | "NotFound") => StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        Some("AccessDenied" | "Forbidden" | "AllAccessDisabled") => StorageError::AccessDenied {
            bucket: bucket.to_string(),
            key: key.to_string(),
        },
        _ => StorageError::Transport(message),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn fetch(&self, bucket: &str, key: &str, local_path: &Path) -> Result<(), StorageError> {
        debug!("Downloading s3://{}/{}", bucket, key);

        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                classify(e.code(), message, bucket, key)
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?
            .into_bytes();

        tokio::fs::write(local_path, &data).await?;
        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(())
    }

    async fn publish(&self, local_path: &Path, bucket: &str, key: &str) -> Result<(), StorageError> {
        debug!("Uploading {:?} to s3://{}/{}", local_path, bucket, key);

        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                let message = DisplayErrorContext(&e).to_string();
                classify(e.code(), message, bucket, key)
            })?;

        Ok(())
    }
}
