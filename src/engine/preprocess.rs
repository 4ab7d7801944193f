//! Image preprocessing utilities for face analysis, swapping and restoration

use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use ndarray::Array4;
use anyhow::Result;

/// Standard input size for face embedding (ArcFace)
pub const EMBEDDER_INPUT_SIZE: u32 = 112;

/// 2x3 affine matrix mapping source coordinates to destination coordinates
pub type Affine = [[f32; 3]; 2];

/// ArcFace destination landmarks for a 112x112 aligned face
pub const ARCFACE_TEMPLATE: [(f32, f32); 5] = [
    (38.2946, 51.6963),  // left eye
    (73.5318, 51.5014),  // right eye
    (56.0252, 71.7366),  // nose
    (41.5493, 92.3655),  // left mouth
    (70.7299, 92.2041),  // right mouth
];

/// Per-channel normalization applied when building an NCHW tensor:
/// `value = (pixel - mean) / std`
#[derive(Debug, Clone, Copy)]
pub struct Normalization {
    pub mean: f32,
    pub std: f32,
}

impl Normalization {
    pub const fn new(mean: f32, std: f32) -> Self {
        Self { mean, std }
    }
}

/// Preprocess image for detection model
/// Letterboxes to the detector resolution and normalizes to roughly [-1, 1]
pub fn preprocess_for_detection(image: &DynamicImage, input_size: (u32, u32)) -> Array4<f32> {
    let (target_w, target_h) = input_size;

    let resized = resize_with_padding(image, target_w, target_h);

    image_to_nchw(&resized, Normalization::new(127.5, 128.0))
}

/// Resize image with padding to maintain aspect ratio
fn resize_with_padding(image: &DynamicImage, target_w: u32, target_h: u32) -> RgbImage {
    let info = ResizeInfo::new(image.dimensions(), (target_w, target_h));
    let new_w = ((info.original_width as f32 * info.scale) as u32).clamp(1, target_w);
    let new_h = ((info.original_height as f32 * info.scale) as u32).clamp(1, target_h);

    let resized = image
        .resize_exact(new_w, new_h, image::imageops::FilterType::Triangle)
        .to_rgb8();

    let mut padded = ImageBuffer::from_pixel(target_w, target_h, Rgb([0u8, 0, 0]));
    image::imageops::overlay(&mut padded, &resized, info.offset_x as i64, info.offset_y as i64);

    padded
}

/// Convert an RGB image to an NCHW tensor in RGB channel order
pub fn image_to_nchw(image: &RgbImage, norm: Normalization) -> Array4<f32> {
    let (width, height) = image.dimensions();

    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel[c] as f32 - norm.mean) / norm.std;
        }
    }

    tensor
}

/// Convert a flat NCHW (batch 1) RGB output back to an image,
/// inverting the given normalization and clamping to [0, 255]
pub fn nchw_to_rgb(data: &[f32], width: u32, height: u32, norm: Normalization) -> Result<RgbImage> {
    let plane = (width * height) as usize;
    if data.len() < plane * 3 {
        anyhow::bail!(
            "Output tensor has {} values, expected {} for {}x{}x3",
            data.len(),
            plane * 3,
            width,
            height
        );
    }

    let mut image = RgbImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let offset = (y * width + x) as usize;
        for c in 0..3 {
            let value = data[c * plane + offset] * norm.std + norm.mean;
            pixel[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }

    Ok(image)
}

/// Similarity transform mapping `landmarks` onto the ArcFace template
/// scaled for a square crop of `image_size` pixels
pub fn estimate_norm(landmarks: &[(f32, f32); 5], image_size: u32) -> Affine {
    let (ratio, diff_x) = if image_size % 112 == 0 {
        (image_size as f32 / 112.0, 0.0)
    } else {
        let ratio = image_size as f32 / 128.0;
        (ratio, 8.0 * ratio)
    };

    let mut dst = ARCFACE_TEMPLATE;
    for point in dst.iter_mut() {
        point.0 = point.0 * ratio + diff_x;
        point.1 *= ratio;
    }

    estimate_similarity_transform(landmarks, &dst)
}

/// Align face using 5-point landmarks into a square crop
pub fn align_face(image: &DynamicImage, landmarks: &[(f32, f32); 5], image_size: u32) -> (RgbImage, Affine) {
    let transform = estimate_norm(landmarks, image_size);
    let aligned = warp_affine(&image.to_rgb8(), &transform, image_size, image_size);
    (aligned, transform)
}

/// Estimate similarity transformation matrix from source to destination points
/// Uses the Umeyama algorithm for 2D similarity transformation
/// Reference: "Least-squares estimation of transformation parameters between two point patterns"
pub fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Affine {
    let n = 5.0f32;

    let (mut src_cx, mut src_cy) = (0.0f32, 0.0f32);
    let (mut dst_cx, mut dst_cy) = (0.0f32, 0.0f32);

    for i in 0..5 {
        src_cx += src[i].0;
        src_cy += src[i].1;
        dst_cx += dst[i].0;
        dst_cy += dst[i].1;
    }
    src_cx /= n;
    src_cy /= n;
    dst_cx /= n;
    dst_cy /= n;

    // Sigma = 1/n * sum( (dst_i - dst_mean) * (src_i - src_mean)^T )
    let mut var_src = 0.0f32;
    let mut sigma_00 = 0.0f32;
    let mut sigma_01 = 0.0f32;
    let mut sigma_10 = 0.0f32;
    let mut sigma_11 = 0.0f32;

    for i in 0..5 {
        let sx = src[i].0 - src_cx;
        let sy = src[i].1 - src_cy;
        let dx = dst[i].0 - dst_cx;
        let dy = dst[i].1 - dst_cy;

        var_src += sx * sx + sy * sy;

        sigma_00 += dx * sx;
        sigma_01 += dx * sy;
        sigma_10 += dy * sx;
        sigma_11 += dy * sy;
    }

    var_src /= n;
    sigma_00 /= n;
    sigma_01 /= n;
    sigma_10 /= n;
    sigma_11 /= n;

    // Closed-form 2x2 SVD
    let a = sigma_00;
    let b = sigma_01;
    let c = sigma_10;
    let d = sigma_11;

    let e = (a + d) / 2.0;
    let f = (a - d) / 2.0;
    let g = (c + b) / 2.0;
    let h = (c - b) / 2.0;

    let q = (e * e + h * h).sqrt();
    let r = (f * f + g * g).sqrt();

    let s1 = q + r;
    let s2 = (q - r).abs();

    let a1 = h.atan2(e);
    let a2 = g.atan2(f);

    let theta = (a2 - a1) / 2.0;
    let phi = (a2 + a1) / 2.0;

    let det_sigma = a * d - b * c;

    // R = U * diag(1, sign(det)) * V^T
    let (r00, r01, r10, r11) = if det_sigma >= 0.0 {
        let angle = phi - theta;
        (angle.cos(), -angle.sin(), angle.sin(), angle.cos())
    } else {
        let angle = phi + theta;
        (angle.cos(), angle.sin(), angle.sin(), -angle.cos())
    };

    let trace_sd = if det_sigma >= 0.0 {
        s1 + s2
    } else {
        s1 - s2
    };

    let scale = if var_src > 1e-10 {
        trace_sd / var_src
    } else {
        1.0
    };

    let tx = dst_cx - scale * (r00 * src_cx + r01 * src_cy);
    let ty = dst_cy - scale * (r10 * src_cx + r11 * src_cy);

    [
        [scale * r00, scale * r01, tx],
        [scale * r10, scale * r11, ty],
    ]
}

/// Invert a 2x3 affine matrix
pub fn invert_affine(m: &Affine) -> Affine {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let det = if det.abs() < 1e-12 { 1e-12 } else { det };

    let i00 = m[1][1] / det;
    let i01 = -m[0][1] / det;
    let i10 = -m[1][0] / det;
    let i11 = m[0][0] / det;

    [
        [i00, i01, -(i00 * m[0][2] + i01 * m[1][2])],
        [i10, i11, -(i10 * m[0][2] + i11 * m[1][2])],
    ]
}

/// Map a point through an affine matrix
#[inline]
pub fn apply_affine(m: &Affine, x: f32, y: f32) -> (f32, f32) {
    (
        m[0][0] * x + m[0][1] * y + m[0][2],
        m[1][0] * x + m[1][1] * y + m[1][2],
    )
}

/// Bilinear sample; `None` outside the image
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Option<[f32; 3]> {
    let (w, h) = image.dimensions();
    if w < 2 || h < 2 || x < 0.0 || y < 0.0 || x >= (w - 1) as f32 || y >= (h - 1) as f32 {
        return None;
    }

    let x0 = x as u32;
    let y0 = y as u32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0);
    let p01 = image.get_pixel(x0, y0 + 1);
    let p10 = image.get_pixel(x0 + 1, y0);
    let p11 = image.get_pixel(x0 + 1, y0 + 1);

    let mut out = [0.0f32; 3];
    for c in 0..3 {
        out[c] = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
    }
    Some(out)
}

/// Apply affine transformation to image (backward mapping, bilinear)
pub fn warp_affine(image: &RgbImage, transform: &Affine, out_width: u32, out_height: u32) -> RgbImage {
    let inverse = invert_affine(transform);
    let mut output = ImageBuffer::from_pixel(out_width, out_height, Rgb([0u8, 0, 0]));

    for (x, y, pixel) in output.enumerate_pixels_mut() {
        let (src_x, src_y) = apply_affine(&inverse, x as f32, y as f32);
        if let Some(value) = sample_bilinear(image, src_x, src_y) {
            *pixel = Rgb(value.map(|v| v.round().clamp(0.0, 255.0) as u8));
        }
    }

    output
}

/// Blend an aligned face crop back into the full image.
///
/// `transform` maps full-image coordinates into crop coordinates (the matrix
/// used to produce the crop). The crop border is eroded and feathered by 10%
/// of its width each so the seam fades into the original pixels.
pub fn paste_back(target: &mut RgbImage, face: &RgbImage, transform: &Affine) {
    let inverse = invert_affine(transform);
    let (fw, fh) = (face.width() as f32, face.height() as f32);
    let (tw, th) = target.dimensions();

    let corners = [(0.0, 0.0), (fw, 0.0), (0.0, fh), (fw, fh)]
        .map(|(u, v)| apply_affine(&inverse, u, v));
    let min_x = corners.iter().map(|p| p.0).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let min_y = corners.iter().map(|p| p.1).fold(f32::INFINITY, f32::min).floor().max(0.0) as u32;
    let max_x = (corners.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max).ceil().max(0.0) as u32).min(tw);
    let max_y = (corners.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max).ceil().max(0.0) as u32).min(th);

    let erode = fw * 0.1;
    let feather = (fw * 0.1).max(1.0);

    for y in min_y..max_y {
        for x in min_x..max_x {
            let (u, v) = apply_affine(transform, x as f32, y as f32);
            let edge = u.min(v).min(fw - 1.0 - u).min(fh - 1.0 - v);
            let weight = ((edge - erode) / feather).clamp(0.0, 1.0);
            if weight <= 0.0 {
                continue;
            }

            if let Some(src) = sample_bilinear(face, u, v) {
                let pixel = target.get_pixel_mut(x, y);
                for c in 0..3 {
                    let blended = src[c] * weight + pixel[c] as f32 * (1.0 - weight);
                    pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

/// Decode image from bytes with EXIF orientation handling
/// The result is always 8-bit RGB
pub fn decode_image(data: &[u8]) -> Result<DynamicImage> {
    if data.is_empty() {
        anyhow::bail!("image data is empty");
    }

    let image = image::load_from_memory(data)?;

    let oriented_image = apply_exif_orientation(data, image);

    Ok(DynamicImage::ImageRgb8(oriented_image.to_rgb8()))
}

/// Apply EXIF orientation to correct image rotation
/// Mobile phones often store images with EXIF orientation tags instead of rotating pixels
fn apply_exif_orientation(data: &[u8], image: DynamicImage) -> DynamicImage {
    use std::io::Cursor;

    let orientation = match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => {
            exif_data
                .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
                .and_then(|field| field.value.get_uint(0))
                .unwrap_or(1) as u8
        }
        Err(_) => 1,
    };

    // See: https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

/// Letterbox parameters for mapping detections back to the original image
#[derive(Debug, Clone)]
pub struct ResizeInfo {
    pub scale: f32,
    pub offset_x: u32,
    pub offset_y: u32,
    pub original_width: u32,
    pub original_height: u32,
}

impl ResizeInfo {
    pub fn new(original: (u32, u32), target: (u32, u32)) -> Self {
        let (orig_w, orig_h) = original;
        let (target_w, target_h) = target;

        let scale = f32::min(
            target_w as f32 / orig_w.max(1) as f32,
            target_h as f32 / orig_h.max(1) as f32,
        );

        let new_w = ((orig_w as f32 * scale) as u32).min(target_w);
        let new_h = ((orig_h as f32 * scale) as u32).min(target_h);

        Self {
            scale,
            offset_x: (target_w - new_w) / 2,
            offset_y: (target_h - new_h) / 2,
            original_width: orig_w,
            original_height: orig_h,
        }
    }

    /// Convert detection coordinates back to original image space
    pub fn to_original(&self, x: f32, y: f32) -> (f32, f32) {
        let x = (x - self.offset_x as f32) / self.scale;
        let y = (y - self.offset_y as f32) / self.scale;
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-3, "{} != {}", a, b);
    }

    #[test]
    fn test_similarity_transform_identity() {
        let m = estimate_similarity_transform(&ARCFACE_TEMPLATE, &ARCFACE_TEMPLATE);
        assert_close(m[0][0], 1.0);
        assert_close(m[0][1], 0.0);
        assert_close(m[1][1], 1.0);
        assert_close(m[0][2], 0.0);
        assert_close(m[1][2], 0.0);
    }

    #[test]
    fn test_similarity_transform_recovers_scale_and_shift() {
        let src = ARCFACE_TEMPLATE.map(|(x, y)| (x * 2.0 + 10.0, y * 2.0 + 20.0));
        let m = estimate_similarity_transform(&src, &ARCFACE_TEMPLATE);
        let (x, y) = apply_affine(&m, src[2].0, src[2].1);
        assert_close(m[0][0], 0.5);
        assert_close(x, ARCFACE_TEMPLATE[2].0);
        assert_close(y, ARCFACE_TEMPLATE[2].1);
    }

    #[test]
    fn test_estimate_norm_128_shifts_template() {
        let m = estimate_norm(&ARCFACE_TEMPLATE, 128);
        assert_close(m[0][0], 1.0);
        assert_close(m[0][2], 8.0);
        assert_close(m[1][2], 0.0);
    }

    #[test]
    fn test_invert_affine_roundtrip_point() {
        let m: Affine = [[0.8, -0.6, 12.0], [0.6, 0.8, -4.0]];
        let inv = invert_affine(&m);
        let (x, y) = apply_affine(&m, 30.0, 40.0);
        let (bx, by) = apply_affine(&inv, x, y);
        assert_close(bx, 30.0);
        assert_close(by, 40.0);
    }

    #[test]
    fn test_paste_back_blends_center_only() {
        let mut target = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        let face = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
        let transform: Affine = [[1.0, 0.0, -16.0], [0.0, 1.0, -16.0]];

        paste_back(&mut target, &face, &transform);

        assert_eq!(target.get_pixel(32, 32), &Rgb([255, 255, 255]));
        assert_eq!(target.get_pixel(17, 17), &Rgb([0, 0, 0]));
        assert_eq!(target.get_pixel(2, 2), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_nchw_roundtrip_normalization() {
        let image = RgbImage::from_pixel(4, 3, Rgb([10, 128, 250]));
        let norm = Normalization::new(127.5, 127.5);
        let tensor = image_to_nchw(&image, norm);
        assert_eq!(tensor.shape(), &[1, 3, 3, 4]);

        let data: Vec<f32> = tensor.iter().copied().collect();
        let restored = nchw_to_rgb(&data, 4, 3, norm).unwrap();
        assert_eq!(restored.get_pixel(1, 1), &Rgb([10, 128, 250]));
    }

    #[test]
    fn test_nchw_to_rgb_rejects_short_output() {
        let err = nchw_to_rgb(&[0.0; 10], 4, 4, Normalization::new(0.0, 255.0));
        assert!(err.is_err());
    }

    #[test]
    fn test_resize_info_letterbox() {
        let info = ResizeInfo::new((1280, 640), (640, 640));
        assert_close(info.scale, 0.5);
        assert_eq!(info.offset_x, 0);
        assert_eq!(info.offset_y, 160);
        let (x, y) = info.to_original(320.0, 320.0);
        assert_close(x, 640.0);
        assert_close(y, 320.0);
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(decode_image(&[]).is_err());
        assert!(decode_image(b"not an image").is_err());
    }
}
