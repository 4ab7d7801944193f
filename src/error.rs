//! Error taxonomy for the swap pipeline

use std::fmt;

use thiserror::Error;

use crate::storage::StorageError;

/// Which of the two source images an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Role,
    Child,
}

impl ImageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRole::Role => "role",
            ImageRole::Child => "child",
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SwapError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Models not ready: {0}")]
    NotReady(String),

    #[error("Failed to fetch {image} image s3://{bucket}/{key}: {source}")]
    Fetch {
        image: ImageRole,
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Failed to load {image} image: {reason}")]
    Decode { image: ImageRole, reason: String },

    #[error("Face not detected in {0} image")]
    NoFaceDetected(ImageRole),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Restoration returned no images")]
    RestorationEmptyResult,

    #[error("Restoration returned {actual} output for {expected} input")]
    RestorationType { expected: String, actual: String },

    #[error("Failed to encode output image: {0}")]
    Encode(String),

    #[error("Failed to publish s3://{bucket}/{key}: {source}")]
    Publish {
        bucket: String,
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SwapError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            SwapError::InvalidRequest(_) => "INVALID_REQUEST",
            SwapError::NotReady(_) => "NOT_READY",
            SwapError::Fetch { .. } => "FETCH_FAILED",
            SwapError::Decode { .. } => "DECODE_FAILED",
            SwapError::NoFaceDetected(_) => "NO_FACE_DETECTED",
            SwapError::Inference(_) => "INFERENCE_FAILED",
            SwapError::RestorationEmptyResult => "RESTORATION_EMPTY_RESULT",
            SwapError::RestorationType { .. } => "RESTORATION_TYPE_MISMATCH",
            SwapError::Encode(_) => "ENCODE_FAILED",
            SwapError::Publish { .. } => "PUBLISH_FAILED",
            SwapError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether resubmitting the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, SwapError::NotReady(_))
    }
}
