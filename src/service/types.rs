//! Service layer types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SwapError;

/// A `{bucket, key}` pair identifying one object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub bucket: String,
    pub key: String,
}

impl ImageRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Last path segment of the key
    pub fn basename(&self) -> &str {
        basename(&self.key)
    }
}

fn basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// A validated face swap request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSwapRequest {
    pub role: ImageRef,
    pub child: ImageRef,
    pub output_bucket: String,
}

impl FaceSwapRequest {
    /// Build a request, rejecting empty fields
    pub fn new(role: ImageRef, child: ImageRef, output_bucket: impl Into<String>) -> Result<Self, SwapError> {
        let output_bucket = output_bucket.into();

        let fields = [
            ("role_bucket", &role.bucket),
            ("role_key", &role.key),
            ("child_bucket", &child.bucket),
            ("child_key", &child.key),
            ("output_bucket", &output_bucket),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(SwapError::InvalidRequest(format!("{} must not be empty", name)));
        }

        Ok(Self {
            role,
            child,
            output_bucket,
        })
    }
}

/// How the destination key is derived from the child key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKeyPolicy {
    /// `result-<basename>`
    #[default]
    Simple,
    /// `result-<request id>-<basename>`
    IdQualified,
}

impl OutputKeyPolicy {
    pub fn output_key(&self, request_id: &str, child_key: &str) -> String {
        match self {
            OutputKeyPolicy::Simple => format!("result-{}", basename(child_key)),
            OutputKeyPolicy::IdQualified => format!("result-{}-{}", request_id, basename(child_key)),
        }
    }
}

/// Successful swap result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapResult {
    pub status: String,
    pub output: String,
}

impl SwapResult {
    pub fn done(output: String) -> Self {
        Self {
            status: "done".to_string(),
            output,
        }
    }
}

/// Health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub ready: bool,
    pub version: String,
    pub models_loaded: HashMap<String, bool>,
    pub restoration_enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_key_uses_basename() {
        let policy = OutputKeyPolicy::Simple;
        assert_eq!(policy.output_key("id", "c.jpg"), "result-c.jpg");
        assert_eq!(policy.output_key("id", "uploads/2024/c.jpg"), "result-c.jpg");
    }

    #[test]
    fn test_id_qualified_key() {
        let policy = OutputKeyPolicy::IdQualified;
        assert_eq!(policy.output_key("abc-123", "kids/c.png"), "result-abc-123-c.png");
    }

    #[test]
    fn test_request_rejects_empty_fields() {
        let err = FaceSwapRequest::new(
            ImageRef::new("b1", "r.jpg"),
            ImageRef::new("b2", " "),
            "out",
        )
        .unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert!(err.to_string().contains("child_key"));
    }

    #[test]
    fn test_image_ref_basename() {
        assert_eq!(ImageRef::new("b", "a/b/c.jpg").basename(), "c.jpg");
        assert_eq!(ImageRef::new("b", "c.jpg").basename(), "c.jpg");
    }

    #[test]
    fn test_result_serializes_as_done() {
        let json = serde_json::to_value(SwapResult::done("result-c.jpg".into())).unwrap();
        assert_eq!(json, serde_json::json!({"status": "done", "output": "result-c.jpg"}));
    }
}
