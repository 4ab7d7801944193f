//! Job handler
//!
//! Runs one swap per job envelope. Used by `POST /run` and by the
//! one-shot `--job` CLI mode.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::error::SwapError;
use crate::service::{FaceSwapRequest, SwapResult, SwapService};
use crate::storage::ObjectStore;

use super::dto::{JobRequest, JobResponse};

pub struct JobHandler<S: ObjectStore> {
    service: Arc<SwapService<S>>,
}

impl<S: ObjectStore> Clone for JobHandler<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

impl<S: ObjectStore> JobHandler<S> {
    pub fn new(service: Arc<SwapService<S>>) -> Self {
        Self { service }
    }

    /// Run the job and wrap the outcome in a response envelope
    pub async fn handle(&self, job: JobRequest) -> JobResponse {
        let id = job.id.clone().unwrap_or_else(|| Uuid::new_v4().to_string());
        info!("Job {} received", id);

        match self.run(job).await {
            Ok(output) => JobResponse::completed(id, output),
            Err(e) => JobResponse::failed(id, &e),
        }
    }

    /// Run the job's input through the processor
    pub async fn run(&self, job: JobRequest) -> Result<SwapResult, SwapError> {
        let input = job
            .input
            .ok_or_else(|| SwapError::InvalidRequest("job has no `input`".to_string()))?;
        let request = FaceSwapRequest::try_from(input)?;

        self.service.process(request).await
    }
}
