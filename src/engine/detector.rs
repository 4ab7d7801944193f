//! SCRFD Face Detector
//!
//! Face detection using the InsightFace SCRFD model.
//! Outputs bounding boxes and 5-point landmarks.

use image::{DynamicImage, GenericImageView};
use anyhow::Result;

use super::backend::{read_tensor_f32, tensor_from_array, SafeCompiledModel};
use super::preprocess::{preprocess_for_detection, ResizeInfo};

/// Face detection result
#[derive(Debug, Clone)]
pub struct FaceBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub landmarks: [(f32, f32); 5],
}

impl FaceBox {
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }
}

/// SCRFD Face Detector
pub struct FaceDetector {
    model: SafeCompiledModel,
    input_size: (u32, u32),
    confidence_threshold: f32,
    nms_threshold: f32,
}

impl FaceDetector {
    /// Create a new face detector for a fixed input resolution
    pub fn new(model: SafeCompiledModel, input_size: (u32, u32), confidence_threshold: f32) -> Self {
        Self {
            model,
            input_size,
            confidence_threshold,
            nms_threshold: 0.4,
        }
    }

    /// Detect faces in an image, highest confidence first
    pub fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceBox>> {
        let resize_info = ResizeInfo::new(image.dimensions(), self.input_size);

        let input_tensor = preprocess_for_detection(image, self.input_size);
        let input = tensor_from_array(&input_tensor)?;

        let mut request = self.model.create_infer_request()?;
        request.set_input_tensor(&input)?;
        request.infer()?;

        // Count outputs to determine model type
        let mut outputs = Vec::new();
        for i in 0..20 {
            match request.get_output_tensor_by_index(i) {
                Ok(tensor) => outputs.push(read_tensor_f32(&tensor)?),
                Err(_) => break,
            }
        }

        let detections = decode_outputs(
            &outputs,
            self.input_size,
            self.confidence_threshold,
            &resize_info,
        );

        let final_detections = nms(detections, self.nms_threshold);

        tracing::debug!("Detected {} faces after NMS", final_detections.len());

        Ok(final_detections)
    }
}

/// Decode raw SCRFD outputs into boxes in original image coordinates
///
/// InsightFace det_10g.onnx has 9 outputs:
/// - outputs 0-2: scores for stride 8, 16, 32
/// - outputs 3-5: bbox_preds for stride 8, 16, 32
/// - outputs 6-8: kps_preds for stride 8, 16, 32
pub fn decode_outputs(
    outputs: &[Vec<f32>],
    input_size: (u32, u32),
    threshold: f32,
    resize_info: &ResizeInfo,
) -> Vec<FaceBox> {
    let mut all_boxes = Vec::new();

    let (fmc, use_kps, num_anchors) = match outputs.len() {
        6 => (3, false, 2),
        9 => (3, true, 2),
        10 => (5, false, 1),
        15 => (5, true, 1),
        other => {
            tracing::warn!("Unknown SCRFD output count: {}", other);
            return all_boxes;
        }
    };

    let strides: &[i32] = if fmc == 3 { &[8, 16, 32] } else { &[8, 16, 32, 64, 128] };

    let (input_w, input_h) = (input_size.0 as i32, input_size.1 as i32);

    for (idx, &stride) in strides.iter().enumerate() {
        let scores = &outputs[idx];
        let bboxes = &outputs[idx + fmc];
        let kps = if use_kps { Some(&outputs[idx + fmc * 2]) } else { None };

        let feat_h = input_h / stride;
        let feat_w = input_w / stride;
        let stride_f = stride as f32;

        let anchor_centers = (0..feat_h).flat_map(|y| {
            (0..feat_w).flat_map(move |x| {
                std::iter::repeat((x as f32 * stride_f, y as f32 * stride_f)).take(num_anchors)
            })
        });

        for (i, (cx, cy)) in anchor_centers.enumerate() {
            let Some(&score) = scores.get(i) else {
                break;
            };

            if score < threshold {
                continue;
            }

            // Distance format: left, top, right, bottom
            let bbox_idx = i * 4;
            if bbox_idx + 3 >= bboxes.len() {
                continue;
            }

            let x1 = cx - bboxes[bbox_idx] * stride_f;
            let y1 = cy - bboxes[bbox_idx + 1] * stride_f;
            let x2 = cx + bboxes[bbox_idx + 2] * stride_f;
            let y2 = cy + bboxes[bbox_idx + 3] * stride_f;

            let mut landmarks = [(0.0f32, 0.0f32); 5];
            if let Some(kps_data) = kps {
                let kps_idx = i * 10;
                if kps_idx + 9 < kps_data.len() {
                    for (j, landmark) in landmarks.iter_mut().enumerate() {
                        let lx = cx + kps_data[kps_idx + j * 2] * stride_f;
                        let ly = cy + kps_data[kps_idx + j * 2 + 1] * stride_f;
                        *landmark = resize_info.to_original(lx, ly);
                    }
                }
            }

            let (orig_x1, orig_y1) = resize_info.to_original(x1, y1);
            let (orig_x2, orig_y2) = resize_info.to_original(x2, y2);

            let max_w = resize_info.original_width as f32;
            let max_h = resize_info.original_height as f32;

            all_boxes.push(FaceBox {
                x1: orig_x1.clamp(0.0, max_w),
                y1: orig_y1.clamp(0.0, max_h),
                x2: orig_x2.clamp(0.0, max_w),
                y2: orig_y2.clamp(0.0, max_h),
                confidence: score,
                landmarks,
            });
        }
    }

    all_boxes
}

/// Non-maximum suppression; output is sorted by confidence (descending)
pub fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    if boxes.is_empty() {
        return boxes;
    }

    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<FaceBox> = Vec::new();

    for candidate in boxes {
        if keep.iter().all(|kept| compute_iou(kept, &candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }

    keep
}

/// Compute intersection over union
pub fn compute_iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union = a.area() + b.area() - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}
