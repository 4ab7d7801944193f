//! REST API request/response data transfer objects

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::SwapError;
use crate::service::{FaceSwapRequest, HealthResult, ImageRef, SwapResult};

/// Swap request body (`POST /generate`, job `input`)
///
/// Every field is optional at the wire level so a missing one is reported
/// as `INVALID_REQUEST` rather than a framework rejection.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub role_bucket: Option<String>,
    pub role_key: Option<String>,
    pub child_bucket: Option<String>,
    pub child_key: Option<String>,
    pub output_bucket: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String, SwapError> {
    value.ok_or_else(|| SwapError::InvalidRequest(format!("missing field `{}`", name)))
}

impl TryFrom<GenerateRequest> for FaceSwapRequest {
    type Error = SwapError;

    fn try_from(body: GenerateRequest) -> Result<Self, Self::Error> {
        let role = ImageRef::new(
            required(body.role_bucket, "role_bucket")?,
            required(body.role_key, "role_key")?,
        );
        let child = ImageRef::new(
            required(body.child_bucket, "child_bucket")?,
            required(body.child_key, "child_key")?,
        );
        FaceSwapRequest::new(role, child, required(body.output_bucket, "output_bucket")?)
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(detail: &str, code: &str) -> Self {
        Self {
            detail: detail.to_string(),
            code: code.to_string(),
        }
    }
}

impl From<&SwapError> for ErrorResponse {
    fn from(e: &SwapError) -> Self {
        Self::new(&e.to_string(), e.code())
    }
}

/// Liveness response
#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    pub models_loaded: bool,
}

/// Health response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ready: bool,
    pub version: String,
    pub models_loaded: HashMap<String, bool>,
    pub restoration_enabled: bool,
}

impl From<HealthResult> for HealthResponse {
    fn from(health: HealthResult) -> Self {
        Self {
            ready: health.ready,
            version: health.version,
            models_loaded: health.models_loaded,
            restoration_enabled: health.restoration_enabled,
        }
    }
}

/// Job envelope
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub input: Option<GenerateRequest>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Completed,
    Failed,
}

/// Job outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<SwapResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl JobResponse {
    pub fn completed(id: String, output: SwapResult) -> Self {
        Self {
            id,
            status: JobStatus::Completed,
            output: Some(output),
            error: None,
            code: None,
        }
    }

    pub fn failed(id: String, e: &SwapError) -> Self {
        Self {
            id,
            status: JobStatus::Failed,
            output: None,
            error: Some(e.to_string()),
            code: Some(e.code().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_is_invalid_request() {
        let body: GenerateRequest = serde_json::from_str(
            r#"{"role_bucket":"b1","role_key":"r.jpg","child_bucket":"b2","child_key":"c.jpg"}"#,
        )
        .unwrap();
        let err = FaceSwapRequest::try_from(body).unwrap_err();
        assert_eq!(err.code(), "INVALID_REQUEST");
        assert!(err.to_string().contains("output_bucket"));
    }

    #[test]
    fn test_complete_body_converts() {
        let body: GenerateRequest = serde_json::from_str(
            r#"{"role_bucket":"b1","role_key":"r.jpg","child_bucket":"b2","child_key":"c.jpg","output_bucket":"out"}"#,
        )
        .unwrap();
        let request = FaceSwapRequest::try_from(body).unwrap();
        assert_eq!(request.role, ImageRef::new("b1", "r.jpg"));
        assert_eq!(request.child, ImageRef::new("b2", "c.jpg"));
        assert_eq!(request.output_bucket, "out");
    }

    #[test]
    fn test_job_response_shapes() {
        let done = JobResponse::completed("j1".into(), SwapResult::done("result-c.jpg".into()));
        assert_eq!(
            serde_json::to_value(&done).unwrap(),
            serde_json::json!({
                "id": "j1",
                "status": "COMPLETED",
                "output": {"status": "done", "output": "result-c.jpg"}
            })
        );

        let failed = JobResponse::failed("j2".into(), &SwapError::RestorationEmptyResult);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["code"], "RESTORATION_EMPTY_RESULT");
        assert!(json.get("output").is_none());
    }
}
