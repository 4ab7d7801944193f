//! Image utility functions

use std::path::Path;

use image::{DynamicImage, ImageFormat};
use anyhow::Result;

/// Output encoding chosen from the destination key's extension,
/// falling back to JPEG for unknown or read-only formats
pub fn output_format(key: &str) -> ImageFormat {
    ImageFormat::from_path(key)
        .ok()
        .filter(|format| format.writing_enabled())
        .unwrap_or(ImageFormat::Jpeg)
}

/// Preferred file extension for a format
pub fn format_extension(format: ImageFormat) -> &'static str {
    format.extensions_str().first().copied().unwrap_or("jpg")
}

/// Encode an image to a file in the given format
pub fn save_image(image: &DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    match format {
        // JPEG has no alpha channel
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format)?,
        _ => image.save_with_format(path, format)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_output_format_from_key() {
        assert_eq!(output_format("result-c.png"), ImageFormat::Png);
        assert_eq!(output_format("result-c.JPG"), ImageFormat::Jpeg);
        assert_eq!(output_format("result-c"), ImageFormat::Jpeg);
        assert_eq!(output_format("result-c.unknown"), ImageFormat::Jpeg);
    }

    #[test]
    fn test_save_image_writes_decodable_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.png");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([1, 2, 3])));

        save_image(&image, &path, ImageFormat::Png).unwrap();

        let decoded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(4, 4), &Rgb([1, 2, 3]));
    }
}
