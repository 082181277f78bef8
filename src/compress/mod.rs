//! Per-page re-encoding: quality selection, color normalization, cropping and
//! JPEG output.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView, RgbImage, RgbaImage};
use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use tracing::debug;

use crate::crop::apply_crop;
use crate::error::PageError;
use crate::settings::{CropConfig, DEFAULT_QUALITY, MIN_QUALITY};
use crate::splitter::split_wide;

mod color;
mod optimizer;
mod quality;

pub use color::{is_grayscale, is_grayscale_rgb};
pub use optimizer::{JpegOptimizer, Jpegtran};
pub use quality::{estimate_quality, quality_for_density, FALLBACK_QUALITY, NON_JPEG_QUALITY};

pub const QUALITY_FLOOR: u8 = MIN_QUALITY;
const SINGLE_PAGE_QUALITY_MARGIN: u8 = 5;
const SPLIT_PAGE_QUALITY_MARGIN: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressOptions {
    pub target_quality: u8,
    pub crop: CropConfig,
    pub force_grayscale: bool,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            target_quality: DEFAULT_QUALITY,
            crop: CropConfig::default(),
            force_grayscale: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    pub original_size: u64,
    pub compressed_size: u64,
    pub is_grayscale: bool,
    pub quality_used: u8,
    pub original_quality: u8,
}

impl CompressionStats {
    pub fn ratio(&self) -> f64 {
        if self.original_size == 0 {
            1.0
        } else {
            self.compressed_size as f64 / self.original_size as f64
        }
    }

    pub fn saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

#[derive(Debug, Clone)]
pub struct CompressedPage {
    pub data: Vec<u8>,
    pub stats: CompressionStats,
}

/// Both halves of a split spread, `first` being the right-hand page.
#[derive(Debug, Clone)]
pub struct CompressedSpread {
    pub first: Vec<u8>,
    pub second: Vec<u8>,
    pub stats: CompressionStats,
}

#[derive(Clone, Default)]
pub struct CompressionEngine {
    optimizer: Option<Arc<dyn JpegOptimizer>>,
}

impl CompressionEngine {
    pub fn new() -> Self {
        Self { optimizer: None }
    }

    pub fn with_optimizer(optimizer: Arc<dyn JpegOptimizer>) -> Self {
        Self {
            optimizer: Some(optimizer),
        }
    }

    pub fn compress(
        &self,
        data: &[u8],
        options: &CompressOptions,
    ) -> Result<CompressedPage, PageError> {
        let original_quality = estimate_quality(data);
        let quality = select_quality(
            options.target_quality,
            original_quality,
            SINGLE_PAGE_QUALITY_MARGIN,
        );

        let image = normalize_color(image::load_from_memory(data)?);
        let image = apply_crop(image, &options.crop);
        let image = if options.force_grayscale || is_grayscale(&image) {
            into_grayscale(image)
        } else {
            image
        };
        let is_gray = matches!(image, DynamicImage::ImageLuma8(_));

        let encoded = self.encode(&image, quality)?;
        let stats = CompressionStats {
            original_size: data.len() as u64,
            compressed_size: encoded.len() as u64,
            is_grayscale: is_gray,
            quality_used: quality,
            original_quality,
        };
        debug!(
            original = stats.original_size,
            compressed = stats.compressed_size,
            quality,
            original_quality,
            grayscale = is_gray,
            "page compressed"
        );

        Ok(CompressedPage {
            data: encoded,
            stats,
        })
    }

    /// Splits a spread into (right, left) and compresses both halves.
    ///
    /// Grayscale is decided once for the whole spread so the two halves
    /// always match.
    pub fn split_and_compress(
        &self,
        data: &[u8],
        options: &CompressOptions,
    ) -> Result<CompressedSpread, PageError> {
        let original_quality = estimate_quality(data);
        let quality = select_quality(
            options.target_quality,
            original_quality,
            SPLIT_PAGE_QUALITY_MARGIN,
        );

        let image = normalize_color(image::load_from_memory(data)?);
        let grayscale = options.force_grayscale || is_grayscale(&image);

        let (right, left) = split_wide(&image);
        drop(image);

        let encode_half = |half: DynamicImage| -> Result<Vec<u8>, PageError> {
            let half = apply_crop(half, &options.crop);
            let half = if grayscale { into_grayscale(half) } else { half };
            self.encode(&half, quality)
        };
        let first = encode_half(right)?;
        let second = encode_half(left)?;

        let stats = CompressionStats {
            original_size: data.len() as u64,
            compressed_size: (first.len() + second.len()) as u64,
            is_grayscale: grayscale,
            quality_used: quality,
            original_quality,
        };
        debug!(
            original = stats.original_size,
            compressed = stats.compressed_size,
            quality,
            "spread split and compressed"
        );

        Ok(CompressedSpread {
            first,
            second,
            stats,
        })
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PageError> {
        let encoded = encode_jpeg(image, quality)?;
        let Some(optimizer) = &self.optimizer else {
            return Ok(encoded);
        };

        match optimizer.optimize(&encoded) {
            Ok(optimized) => Ok(optimized),
            Err(err) => {
                debug!(error = %err, "optimizer failed, keeping encoder output");
                Ok(encoded)
            }
        }
    }
}

pub fn select_quality(target: u8, estimated: u8, margin: u8) -> u8 {
    let ceiling = target.max(QUALITY_FLOOR);
    estimated
        .saturating_sub(margin)
        .min(ceiling)
        .max(QUALITY_FLOOR)
}

/// Brings any decoded image into one of the two encodable layouts:
/// 8-bit single channel or 8-bit RGB. Transparency is composited onto white.
pub fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        other if other.color().has_alpha() => {
            DynamicImage::ImageRgb8(flatten_on_white(&other.to_rgba8()))
        }
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn flatten_on_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn into_grayscale(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_) => image,
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}

/// Baseline grayscale or progressive 4:2:0 color, with optimized Huffman tables.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, PageError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PageError::Empty);
    }
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(PageError::Oversized { width, height });
    }

    let mut buffer = Vec::new();
    match image {
        DynamicImage::ImageLuma8(gray) => {
            let mut encoder = Encoder::new(&mut buffer, quality);
            encoder.set_optimized_huffman_tables(true);
            encoder.encode(gray.as_raw(), width as u16, height as u16, ColorType::Luma)?;
        }
        other => {
            let rgb = other.to_rgb8();
            let mut encoder = Encoder::new(&mut buffer, quality);
            encoder.set_sampling_factor(SamplingFactor::R_4_2_0);
            encoder.set_progressive(true);
            encoder.set_optimized_huffman_tables(true);
            encoder.encode(rgb.as_raw(), width as u16, height as u16, ColorType::Rgb)?;
        }
    }
    Ok(buffer)
}
