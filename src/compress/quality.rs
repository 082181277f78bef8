use std::io::Cursor;

use image::{ImageFormat, ImageReader};

pub const FALLBACK_QUALITY: u8 = 80;
pub const NON_JPEG_QUALITY: u8 = 95;

// Upper bounds on bytes per pixel for each guessed JPEG quality.
const DENSITY_STEPS: [(f64, u8); 4] = [(0.15, 60), (0.25, 70), (0.4, 80), (0.6, 85)];
const DENSEST_QUALITY: u8 = 90;

/// Guesses the quality a source was saved at from its container and density.
///
/// Only the header is read, so this is cheap enough to run on every page.
pub fn estimate_quality(data: &[u8]) -> u8 {
    let reader = match ImageReader::new(Cursor::new(data)).with_guessed_format() {
        Ok(reader) => reader,
        Err(_) => return FALLBACK_QUALITY,
    };

    match reader.format() {
        Some(ImageFormat::Jpeg) => {}
        Some(_) => return NON_JPEG_QUALITY,
        None => return FALLBACK_QUALITY,
    }

    let (width, height) = match reader.into_dimensions() {
        Ok(dimensions) => dimensions,
        Err(_) => return FALLBACK_QUALITY,
    };
    let pixels = width as u64 * height as u64;
    if pixels == 0 {
        return FALLBACK_QUALITY;
    }

    quality_for_density(data.len() as f64 / pixels as f64)
}

pub fn quality_for_density(bytes_per_pixel: f64) -> u8 {
    DENSITY_STEPS
        .iter()
        .find(|(limit, _)| bytes_per_pixel < *limit)
        .map(|&(_, quality)| quality)
        .unwrap_or(DENSEST_QUALITY)
}
