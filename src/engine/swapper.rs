//! InSwapper identity swap
//!
//! Aligns the target face to a 128x128 crop, swaps in the source identity
//! latent, and pastes the generated face back into the full target image.

use image::DynamicImage;
use ndarray::Array2;
use anyhow::{Context, Result};

use super::backend::{read_tensor_f32, tensor_from_array, SafeCompiledModel};
use super::onnx::Emap;
use super::preprocess::{align_face, image_to_nchw, nchw_to_rgb, paste_back, Normalization};
use super::{DetectedFace, FaceSwapper};

/// Aligned crop size expected by inswapper_128
pub const SWAPPER_INPUT_SIZE: u32 = 128;

/// Pixel scaling used by the swapper on both input and output: [0, 255] <-> [0, 1]
const SWAPPER_NORM: Normalization = Normalization::new(0.0, 255.0);

pub struct InSwapper {
    model: SafeCompiledModel,
    emap: Emap,
}

impl InSwapper {
    pub fn new(model: SafeCompiledModel, emap: Emap) -> Self {
        Self { model, emap }
    }
}

impl FaceSwapper for InSwapper {
    fn swap(
        &mut self,
        target: &DynamicImage,
        target_face: &DetectedFace,
        source_face: &DetectedFace,
    ) -> Result<DynamicImage> {
        let (aligned, transform) = align_face(target, target_face.landmarks(), SWAPPER_INPUT_SIZE);

        let target_blob = tensor_from_array(&image_to_nchw(&aligned, SWAPPER_NORM))?;

        let latent = self.emap.project(&source_face.embedding)?;
        let latent = Array2::from_shape_vec((1, latent.len()), latent)?;
        let source_blob = tensor_from_array(&latent)?;

        let mut request = self.model.create_infer_request()?;
        request.set_tensor("target", &target_blob)?;
        request.set_tensor("source", &source_blob)?;
        request.infer().context("Swapper inference failed")?;

        let output = read_tensor_f32(&request.get_output_tensor()?)?;
        let swapped = nchw_to_rgb(&output, SWAPPER_INPUT_SIZE, SWAPPER_INPUT_SIZE, SWAPPER_NORM)?;

        let mut composite = target.to_rgb8();
        paste_back(&mut composite, &swapped, &transform);

        Ok(DynamicImage::ImageRgb8(composite))
    }
}
