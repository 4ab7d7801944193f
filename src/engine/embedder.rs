//! ArcFace Face Embedder
//!
//! Identity embedding for aligned 112x112 face crops.
//! The swapper consumes the normalized vector as its source identity.

use image::RgbImage;
use anyhow::Result;

use crate::utils::math::l2_normalize;

use super::backend::{read_tensor_f32, tensor_from_array, SafeCompiledModel};
use super::preprocess::{image_to_nchw, Normalization, EMBEDDER_INPUT_SIZE};

/// Face embedding result
#[derive(Debug, Clone)]
pub struct FaceEmbedding {
    pub vector: Vec<f32>,
}

impl FaceEmbedding {
    /// Create a new normalized embedding
    pub fn new(mut vector: Vec<f32>) -> Self {
        l2_normalize(&mut vector);
        Self { vector }
    }
}

/// ArcFace Face Embedder
pub struct FaceEmbedder {
    model: SafeCompiledModel,
}

impl FaceEmbedder {
    pub fn new(model: SafeCompiledModel) -> Self {
        Self { model }
    }

    /// Extract embedding from an aligned face image
    pub fn embed(&mut self, aligned_face: &RgbImage) -> Result<FaceEmbedding> {
        if aligned_face.dimensions() != (EMBEDDER_INPUT_SIZE, EMBEDDER_INPUT_SIZE) {
            anyhow::bail!(
                "Embedder expects a {0}x{0} aligned face, got {1:?}",
                EMBEDDER_INPUT_SIZE,
                aligned_face.dimensions()
            );
        }

        let input_tensor = image_to_nchw(aligned_face, Normalization::new(127.5, 127.5));
        let input = tensor_from_array(&input_tensor)?;

        let mut request = self.model.create_infer_request()?;
        request.set_input_tensor(&input)?;
        request.infer()?;

        let output = request.get_output_tensor()?;
        let output_data = read_tensor_f32(&output)?;

        Ok(FaceEmbedding::new(output_data))
    }
}
