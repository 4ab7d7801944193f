//! OpenVINO backend
//!
//! Wraps the OpenVINO handles so they can live inside the registry, converts
//! between ndarray tensors and OpenVINO tensors, and builds the concrete
//! engines from the configured model files.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use ndarray::{Array, Dimension};
use openvino::{CompiledModel, Core, ElementType, InferRequest, Shape, Tensor};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::ModelsConfig;

use super::analysis::InsightFaceAnalyzer;
use super::detector::FaceDetector;
use super::embedder::FaceEmbedder;
use super::onnx::read_emap;
use super::registry::EngineFactory;
use super::restorer::GfpganRestorer;
use super::swapper::InSwapper;
use super::{FaceAnalyzer, FaceRestorer, FaceSwapper};

/// Wrapper for OpenVINO Core that implements Send + Sync
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

impl Deref for SafeCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::ops::DerefMut for SafeCore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Wrapper for OpenVINO CompiledModel that can move between threads.
/// Access is serialized by the registry's engine lock.
pub struct SafeCompiledModel(CompiledModel);
unsafe impl Send for SafeCompiledModel {}

impl SafeCompiledModel {
    /// Create an inference request
    pub fn create_infer_request(&mut self) -> Result<InferRequest> {
        Ok(self.0.create_infer_request()?)
    }
}

/// Copy an ndarray into a new f32 OpenVINO tensor
pub fn tensor_from_array<D: Dimension>(array: &Array<f32, D>) -> Result<Tensor> {
    let dims: Vec<i64> = array.shape().iter().map(|&d| d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let contiguous = array.as_standard_layout();
    let values = contiguous
        .as_slice()
        .context("Input array is not contiguous")?;

    let raw = tensor.get_raw_data_mut()?;
    for (chunk, value) in raw.chunks_exact_mut(4).zip(values) {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }

    Ok(tensor)
}

/// Read tensor data as f32 vector
pub fn read_tensor_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let shape = tensor.get_shape()?;
    let total_elements: i64 = shape.get_dimensions().iter().product();

    let raw = tensor.get_raw_data()?;
    let data: Vec<f32> = raw
        .chunks_exact(4)
        .take(total_elements as usize)
        .map(|chunk| f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(data)
}

/// Use the model at `path`, downloading it from `url` first if it is missing
pub fn resolve_model(path: &Path, url: Option<&str>) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    let Some(url) = url else {
        anyhow::bail!("Model not found at {:?} and no download URL configured", path);
    };

    warn!("Model {:?} not found, downloading from {}", path, url);
    let start = Instant::now();

    let bytes = reqwest::blocking::get(url)
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.bytes())
        .with_context(|| format!("Failed to download model from {}", url))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = path.with_extension("part");
    std::fs::write(&partial, &bytes)?;
    std::fs::rename(&partial, path)?;

    info!("Downloaded {} bytes to {:?} in {:?}", bytes.len(), path, start.elapsed());
    Ok(path.to_path_buf())
}

/// Builds OpenVINO engines from the configured model files
pub struct OpenVinoEngineFactory {
    core: Mutex<SafeCore>,
    config: ModelsConfig,
}

impl OpenVinoEngineFactory {
    pub fn new(config: &ModelsConfig) -> Result<Self> {
        let core = Core::new()?;

        Ok(Self {
            core: Mutex::new(SafeCore(core)),
            config: config.clone(),
        })
    }

    fn compile(&self, path: &Path) -> Result<SafeCompiledModel> {
        let path_str = path
            .to_str()
            .with_context(|| format!("Model path {:?} is not valid UTF-8", path))?;

        info!("Loading model from {}", path_str);
        let start = Instant::now();

        // Core methods like read_model require &mut self in Rust bindings
        let mut core = self.core.lock();
        let model = core.read_model_from_file(path_str, "")?;
        let compiled = core.compile_model(&model, self.config.device.as_str().into())?;

        info!("Model {} compiled for {} in {:?}", path_str, self.config.device, start.elapsed());
        Ok(SafeCompiledModel(compiled))
    }

    fn detector(&self) -> Result<FaceDetector> {
        let model = self.compile(&resolve_model(&self.config.detector, None)?)?;
        Ok(FaceDetector::new(model, self.config.det_size, self.config.det_threshold))
    }
}

impl EngineFactory for OpenVinoEngineFactory {
    fn load_analyzer(&self) -> Result<Box<dyn FaceAnalyzer>> {
        let detector = self.detector().context("Failed to load face detector")?;
        let recognizer = self
            .compile(&resolve_model(&self.config.recognizer, None)?)
            .context("Failed to load face recognizer")?;

        Ok(Box::new(InsightFaceAnalyzer::new(detector, FaceEmbedder::new(recognizer))))
    }

    fn load_swapper(&self) -> Result<Box<dyn FaceSwapper>> {
        let path = resolve_model(&self.config.swapper, self.config.swapper_url.as_deref())?;
        let emap = read_emap(&path)?;
        let model = self.compile(&path)?;

        Ok(Box::new(InSwapper::new(model, emap)))
    }

    fn load_restorer(&self) -> Result<Box<dyn FaceRestorer>> {
        let path = resolve_model(&self.config.restorer, self.config.restorer_url.as_deref())?;
        let model = self.compile(&path)?;
        let detector = self.detector().context("Failed to load restorer face detector")?;

        Ok(Box::new(GfpganRestorer::new(model, detector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_resolve_existing_model() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"onnx").unwrap();

        assert_eq!(resolve_model(&path, None).unwrap(), path);
    }

    #[test]
    fn test_resolve_missing_model_without_url() {
        let dir = tempdir().unwrap();
        let err = resolve_model(&dir.path().join("missing.onnx"), None).unwrap_err();
        assert!(err.to_string().contains("no download URL"));
    }
}
