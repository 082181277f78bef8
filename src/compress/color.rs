use image::{DynamicImage, RgbImage};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

const SAMPLE_SIZE: usize = 2000;
const SAMPLE_SEED: u64 = 42;
const NEUTRAL_CHANNEL_DELTA: u8 = 15;
const MIN_NEUTRAL_RATIO: f32 = 0.92;

/// Decides whether a page can be stored as single-channel without visible loss.
///
/// Single-channel images are grayscale by definition. True-color images are
/// judged from a reproducible random sample of pixels. Anything else (alpha,
/// 16-bit color) is reported as color and left to normalization.
pub fn is_grayscale(image: &DynamicImage) -> bool {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => true,
        DynamicImage::ImageRgb8(rgb) => is_grayscale_rgb(rgb),
        _ => false,
    }
}

pub fn is_grayscale_rgb(rgb: &RgbImage) -> bool {
    let total = rgb.width() as usize * rgb.height() as usize;
    if total == 0 {
        return false;
    }

    let amount = SAMPLE_SIZE.min(total);
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let raw = rgb.as_raw();

    let neutral = sample(&mut rng, total, amount)
        .iter()
        .filter(|&index| {
            let pixel = &raw[index * 3..index * 3 + 3];
            pixel[0].abs_diff(pixel[1]) < NEUTRAL_CHANNEL_DELTA
                && pixel[0].abs_diff(pixel[2]) < NEUTRAL_CHANNEL_DELTA
        })
        .count();

    neutral as f32 / amount as f32 > MIN_NEUTRAL_RATIO
}
