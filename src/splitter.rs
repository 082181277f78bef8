use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageReader};

pub fn is_wide(data: &[u8]) -> bool {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .map(|(width, height)| width > height)
        .unwrap_or(false)
}

/// Cuts a spread at its horizontal midpoint and returns the halves in manga
/// reading order: `(right, left)`.
pub fn split_wide(image: &DynamicImage) -> (DynamicImage, DynamicImage) {
    let (width, height) = image.dimensions();
    let mid = width / 2;
    let right = image.crop_imm(mid, 0, width - mid, height);
    let left = image.crop_imm(0, 0, mid, height);
    (right, left)
}
