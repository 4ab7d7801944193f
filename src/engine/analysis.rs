//! Face analysis: detection followed by identity embedding

use image::DynamicImage;
use anyhow::{Context, Result};

use super::detector::FaceDetector;
use super::embedder::FaceEmbedder;
use super::preprocess::{align_face, EMBEDDER_INPUT_SIZE};
use super::{DetectedFace, FaceAnalyzer};

/// SCRFD + ArcFace analysis pipeline
pub struct InsightFaceAnalyzer {
    detector: FaceDetector,
    embedder: FaceEmbedder,
}

impl InsightFaceAnalyzer {
    pub fn new(detector: FaceDetector, embedder: FaceEmbedder) -> Self {
        Self { detector, embedder }
    }
}

impl FaceAnalyzer for InsightFaceAnalyzer {
    fn analyze(&mut self, image: &DynamicImage) -> Result<Vec<DetectedFace>> {
        let boxes = self.detector.detect(image).context("Face detection failed")?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let (aligned, _) = align_face(image, &bbox.landmarks, EMBEDDER_INPUT_SIZE);
            let embedding = self.embedder.embed(&aligned).context("Face embedding failed")?;

            faces.push(DetectedFace {
                bbox,
                embedding: embedding.vector,
            });
        }

        Ok(faces)
    }
}
