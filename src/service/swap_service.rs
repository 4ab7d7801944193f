//! Swap Service - Core business logic
//!
//! Fetches both source images, runs analysis, swap and optional restoration
//! under the registry lock, then publishes the composite.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::engine::{
    preprocess::decode_image, DetectedFace, Engines, FaceAnalyzer, ModelRegistry, RestoreOptions, Restored,
};
use crate::error::{ImageRole, SwapError};
use crate::storage::ObjectStore;
use crate::utils::image::{output_format, save_image};

use super::types::*;
use super::workspace::RequestWorkspace;

/// Face swap service
pub struct SwapService<S: ObjectStore> {
    registry: Arc<ModelRegistry>,
    store: Arc<S>,
    config: PipelineConfig,
}

impl<S: ObjectStore> Clone for SwapService<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            store: self.store.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: ObjectStore> SwapService<S> {
    pub fn new(registry: Arc<ModelRegistry>, store: Arc<S>, config: PipelineConfig) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Readiness plus per-engine load flags
    pub fn health(&self) -> HealthResult {
        HealthResult {
            ready: self.registry.is_ready(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            models_loaded: self
                .registry
                .status()
                .into_iter()
                .map(|(kind, loaded)| (kind.as_str().to_string(), loaded))
                .collect(),
            restoration_enabled: self.config.restoration_enabled,
        }
    }

    /// Make sure the engines are loaded, triggering the one-time
    /// initialization if nobody has yet
    pub async fn ensure_ready(&self) -> Result<(), SwapError> {
        if self.registry.is_ready() {
            return Ok(());
        }

        let registry = self.registry.clone();
        let outcome = tokio::task::spawn_blocking(move || registry.ensure_ready_once())
            .await
            .map_err(|e| SwapError::Internal(format!("model loading task failed: {}", e)))?;

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(SwapError::NotReady("Models not ready".to_string())),
            Err(e) => Err(SwapError::NotReady(format!("{:#}", e))),
        }
    }

    /// Process one swap request end to end.
    ///
    /// The request runs on its own task. Dropping the returned future does
    /// not cancel it; its temp files are removed when that task finishes.
    pub async fn process(&self, request: FaceSwapRequest) -> Result<SwapResult, SwapError> {
        let service = self.clone();
        tokio::spawn(async move { service.execute(request).await })
            .await
            .map_err(|e| SwapError::Internal(format!("request task failed: {}", e)))?
    }

    async fn execute(&self, request: FaceSwapRequest) -> Result<SwapResult, SwapError> {
        let start = Instant::now();

        self.ensure_ready().await?;

        let request_id = Uuid::new_v4().to_string();
        let output_key = self.config.output_key_policy.output_key(&request_id, &request.child.key);
        let workspace = Arc::new(RequestWorkspace::new(
            &self.config.temp_dir,
            request_id,
            &request,
            output_format(&output_key),
        ));

        info!(
            "Request {}: s3://{}/{} onto s3://{}/{}",
            workspace.request_id(),
            request.child.bucket,
            request.child.key,
            request.role.bucket,
            request.role.key
        );

        let result = self.run(&workspace, &request, output_key).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(done) => info!("Request {} done in {:?}: {}", workspace.request_id(), elapsed, done.output),
            Err(e) => error!(
                "Request {} failed after {:?} [{}]: {}",
                workspace.request_id(),
                elapsed,
                e.code(),
                e
            ),
        }

        result
    }

    async fn run(
        &self,
        workspace: &Arc<RequestWorkspace>,
        request: &FaceSwapRequest,
        output_key: String,
    ) -> Result<SwapResult, SwapError> {
        self.fetch(&request.role, workspace.role_path(), ImageRole::Role).await?;
        self.fetch(&request.child, workspace.child_path(), ImageRole::Child).await?;

        let registry = self.registry.clone();
        let job_workspace = workspace.clone();
        let restoration_enabled = self.config.restoration_enabled;
        tokio::task::spawn_blocking(move || render(&registry, &job_workspace, restoration_enabled))
            .await
            .map_err(|e| SwapError::Internal(format!("render task failed: {}", e)))??;

        self.store
            .publish(workspace.output_path(), &request.output_bucket, &output_key)
            .await
            .map_err(|source| SwapError::Publish {
                bucket: request.output_bucket.clone(),
                key: output_key.clone(),
                source,
            })?;

        Ok(SwapResult::done(output_key))
    }

    async fn fetch(&self, image: &ImageRef, local_path: &Path, role: ImageRole) -> Result<(), SwapError> {
        self.store
            .fetch(&image.bucket, &image.key, local_path)
            .await
            .map_err(|source| SwapError::Fetch {
                image: role,
                bucket: image.bucket.clone(),
                key: image.key.clone(),
                source,
            })
    }
}

/// Decode, compose and encode; runs on the blocking pool
fn render(registry: &ModelRegistry, workspace: &RequestWorkspace, restoration_enabled: bool) -> Result<(), SwapError> {
    let role = load_image(workspace.role_path(), ImageRole::Role)?;
    let child = load_image(workspace.child_path(), ImageRole::Child)?;

    let output = registry
        .with_engines(|engines| compose(engines, &role, &child, restoration_enabled))
        .ok_or_else(|| SwapError::NotReady("Models not ready".to_string()))??;

    save_image(&output, workspace.output_path(), workspace.output_format())
        .map_err(|e| SwapError::Encode(format!("{:#}", e)))
}

fn load_image(path: &Path, image: ImageRole) -> Result<DynamicImage, SwapError> {
    let data = std::fs::read(path).map_err(|e| SwapError::Decode {
        image,
        reason: e.to_string(),
    })?;

    decode_image(&data).map_err(|e| SwapError::Decode {
        image,
        reason: format!("{:#}", e),
    })
}

fn first_face(analyzer: &mut dyn FaceAnalyzer, image: &DynamicImage, role: ImageRole) -> Result<DetectedFace, SwapError> {
    let faces = analyzer
        .analyze(image)
        .map_err(|e| SwapError::Inference(format!("{:#}", e)))?;

    faces.into_iter().next().ok_or(SwapError::NoFaceDetected(role))
}

/// Swap the child's first face onto the role's first face, then restore
/// the composite if enabled
pub fn compose(
    engines: &mut Engines<'_>,
    role: &DynamicImage,
    child: &DynamicImage,
    restoration_enabled: bool,
) -> Result<DynamicImage, SwapError> {
    let role_face = first_face(&mut *engines.analyzer, role, ImageRole::Role)?;
    let child_face = first_face(&mut *engines.analyzer, child, ImageRole::Child)?;

    let composite = engines
        .swapper
        .swap(role, &role_face, &child_face)
        .map_err(|e| SwapError::Inference(format!("{:#}", e)))?;

    if !restoration_enabled {
        return Ok(composite);
    }

    let restorer = engines
        .restorer
        .as_deref_mut()
        .ok_or_else(|| SwapError::Internal("restoration enabled but no restoration engine loaded".to_string()))?;

    let options = RestoreOptions {
        only_center_face: true,
        paste_back: true,
    };
    let restored = restorer
        .restore(&composite, &options)
        .map_err(|e| SwapError::Inference(format!("restoration: {:#}", e)))?;

    normalize_restored(restored, &composite)
}

/// Reduce restoration output to one image of the composite's pixel type
pub fn normalize_restored(restored: Restored, composite: &DynamicImage) -> Result<DynamicImage, SwapError> {
    let image = match restored {
        Restored::Image(image) => image,
        Restored::Candidates(candidates) => candidates
            .into_iter()
            .next()
            .ok_or(SwapError::RestorationEmptyResult)?,
    };

    if image.color() != composite.color() {
        return Err(SwapError::RestorationType {
            expected: format!("{:?}", composite.color()),
            actual: format!("{:?}", image.color()),
        });
    }

    Ok(image)
}
