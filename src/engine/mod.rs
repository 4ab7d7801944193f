//! Inference engine module
//!
//! Provides OpenVINO-based inference with:
//! - Face analysis (SCRFD detection + ArcFace embedding)
//! - Identity swapping with paste-back (InSwapper)
//! - Optional face restoration (GFPGAN)
//! - A process-wide registry that loads each engine at most once

pub mod backend;
pub mod registry;
pub mod detector;
pub mod embedder;
pub mod analysis;
pub mod swapper;
pub mod restorer;
pub mod onnx;
pub mod preprocess;

use image::DynamicImage;

pub use backend::OpenVinoEngineFactory;
pub use registry::{EngineFactory, EngineKind, Engines, ModelRegistry};
pub use detector::{FaceBox, FaceDetector};
pub use embedder::{FaceEmbedder, FaceEmbedding};
pub use analysis::InsightFaceAnalyzer;
pub use swapper::InSwapper;
pub use restorer::GfpganRestorer;

/// A face found by the analysis engine
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub bbox: FaceBox,
    /// L2-normalized identity embedding
    pub embedding: Vec<f32>,
}

impl DetectedFace {
    pub fn landmarks(&self) -> &[(f32, f32); 5] {
        &self.bbox.landmarks
    }
}

/// Options passed to the restoration engine; the input is always a full
/// image, faces are located and aligned by the engine
#[derive(Debug, Clone, Copy)]
pub struct RestoreOptions {
    /// Restore only the face closest to the image centre
    pub only_center_face: bool,
    /// Paste restored faces back into the full image
    pub paste_back: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            only_center_face: true,
            paste_back: true,
        }
    }
}

/// What a restoration engine hands back
#[derive(Debug, Clone)]
pub enum Restored {
    /// A single full image
    Image(DynamicImage),
    /// A collection of candidate images, best first
    Candidates(Vec<DynamicImage>),
}

/// Detects faces and computes identity embeddings
pub trait FaceAnalyzer: Send {
    /// Faces in engine order (highest detection score first)
    fn analyze(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<DetectedFace>>;
}

/// Transplants a source identity onto a target face
pub trait FaceSwapper: Send {
    /// Returns the full-resolution target image with the swapped face pasted back
    fn swap(
        &mut self,
        target: &DynamicImage,
        target_face: &DetectedFace,
        source_face: &DetectedFace,
    ) -> anyhow::Result<DynamicImage>;
}

/// Enhances facial detail in an image
pub trait FaceRestorer: Send {
    fn restore(&mut self, image: &DynamicImage, options: &RestoreOptions) -> anyhow::Result<Restored>;
}
