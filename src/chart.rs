use anyhow::{Context, Result};
use image::GenericImageView;
use std::path::Path;

// Keeps inline payloads within what the vision endpoint accepts.
const MAX_WIDTH: u32 = 1120;
const MAX_HEIGHT: u32 = 1120;

/// Loads a chart image from disk and produces the bare base64 PNG payload
/// (no data-URL header) for the inference request.
pub fn encode_chart_base64(path: &Path) -> Result<String> {
    let mut img = image::open(path)
        .with_context(|| format!("Failed to open chart image: {}", path.display()))?;

    let (width, height) = img.dimensions();

    if width > MAX_WIDTH || height > MAX_HEIGHT {
        let width_ratio = MAX_WIDTH as f32 / width as f32;
        let height_ratio = MAX_HEIGHT as f32 / height as f32;
        let scale = width_ratio.min(height_ratio);

        let new_width = (width as f32 * scale) as u32;
        let new_height = (height as f32 * scale) as u32;

        img = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);
    }

    let mut buffer = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut buffer), image::ImageFormat::Png)
        .context("Failed to encode chart image")?;

    Ok(base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        buffer,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn write_test_png(width: u32, height: u32) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("quantdesk-test-{}x{}.png", width, height));
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([10, 200, 90]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_encodes_png_payload_without_header() {
        let path = write_test_png(4, 4);
        let encoded = encode_chart_base64(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(!encoded.starts_with("data:"));
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        // PNG magic bytes survive the round trip.
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_oversized_image_is_downscaled() {
        let path = write_test_png(2240, 1120);
        let encoded = encode_chart_base64(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&encoded)
            .unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        let (w, h) = img.dimensions();
        assert!(w <= MAX_WIDTH && h <= MAX_HEIGHT);
        assert_eq!((w, h), (1120, 560));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = encode_chart_base64(Path::new("/nonexistent/chart.png"));
        assert!(result.is_err());
    }
}
