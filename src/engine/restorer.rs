//! GFPGAN face restoration
//!
//! Locates faces in the composite, aligns each to the 512x512 FFHQ template,
//! runs the restoration network and blends the result back.

use image::{DynamicImage, GenericImageView, RgbImage};
use anyhow::{Context, Result};

use super::backend::{read_tensor_f32, tensor_from_array, SafeCompiledModel};
use super::detector::{FaceBox, FaceDetector};
use super::preprocess::{
    estimate_similarity_transform, image_to_nchw, nchw_to_rgb, paste_back, warp_affine, Normalization,
};
use super::{FaceRestorer, RestoreOptions, Restored};

/// Aligned crop size expected by GFPGAN
pub const RESTORER_INPUT_SIZE: u32 = 512;

/// FFHQ landmark template for 512x512 crops
pub const FFHQ_TEMPLATE: [(f32, f32); 5] = [
    (192.98138, 239.94708),
    (318.90277, 240.1936),
    (256.63416, 314.01935),
    (201.26117, 371.41043),
    (313.08905, 371.15118),
];

/// [0, 255] <-> [-1, 1]
const RESTORER_NORM: Normalization = Normalization::new(127.5, 127.5);

pub struct GfpganRestorer {
    model: SafeCompiledModel,
    detector: FaceDetector,
}

impl GfpganRestorer {
    pub fn new(model: SafeCompiledModel, detector: FaceDetector) -> Self {
        Self { model, detector }
    }

    /// Run the network on one aligned 512x512 crop
    fn enhance_face(&mut self, aligned: &RgbImage) -> Result<RgbImage> {
        let input = tensor_from_array(&image_to_nchw(aligned, RESTORER_NORM))?;

        let mut request = self.model.create_infer_request()?;
        request.set_input_tensor(&input)?;
        request.infer().context("Restorer inference failed")?;

        let output = read_tensor_f32(&request.get_output_tensor()?)?;
        nchw_to_rgb(&output, RESTORER_INPUT_SIZE, RESTORER_INPUT_SIZE, RESTORER_NORM)
    }
}

/// The face whose box centre is nearest the image centre
pub fn center_face(faces: Vec<FaceBox>, width: u32, height: u32) -> Option<FaceBox> {
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let distance = |face: &FaceBox| {
        let (fx, fy) = face.center();
        (fx - cx).powi(2) + (fy - cy).powi(2)
    };

    faces
        .into_iter()
        .min_by(|a, b| distance(a).total_cmp(&distance(b)))
}

impl FaceRestorer for GfpganRestorer {
    fn restore(&mut self, image: &DynamicImage, options: &RestoreOptions) -> Result<Restored> {
        let mut faces = self.detector.detect(image)?;
        if options.only_center_face {
            let (width, height) = image.dimensions();
            faces = center_face(faces, width, height).into_iter().collect();
        }
        tracing::debug!("Restoring {} faces", faces.len());

        let source = image.to_rgb8();
        let mut output = source.clone();
        let mut restored_faces = Vec::with_capacity(faces.len());

        for face in &faces {
            let transform = estimate_similarity_transform(&face.landmarks, &FFHQ_TEMPLATE);
            let crop = warp_affine(&source, &transform, RESTORER_INPUT_SIZE, RESTORER_INPUT_SIZE);
            let restored = self.enhance_face(&crop)?;

            if options.paste_back {
                paste_back(&mut output, &restored, &transform);
            }
            restored_faces.push(DynamicImage::ImageRgb8(restored));
        }

        if options.paste_back {
            Ok(Restored::Image(DynamicImage::ImageRgb8(output)))
        } else {
            Ok(Restored::Candidates(restored_faces))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face_at(x: f32, y: f32) -> FaceBox {
        FaceBox {
            x1: x - 10.0,
            y1: y - 10.0,
            x2: x + 10.0,
            y2: y + 10.0,
            confidence: 0.9,
            landmarks: [(x, y); 5],
        }
    }

    #[test]
    fn test_center_face_picks_nearest() {
        let faces = vec![face_at(10.0, 10.0), face_at(95.0, 105.0), face_at(190.0, 20.0)];
        let picked = center_face(faces, 200, 200).unwrap();
        assert_eq!(picked.center(), (95.0, 105.0));
    }

    #[test]
    fn test_center_face_empty() {
        assert!(center_face(Vec::new(), 100, 100).is_none());
    }
}
