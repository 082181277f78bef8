//! Whitespace margin and page-number removal for scanned pages.

use image::DynamicImage;

use crate::settings::CropConfig;

mod margins;
pub mod mask;
mod page_number;

pub use margins::crop_margins;
pub use mask::BoundingBox;
pub use page_number::crop_page_number;

pub fn apply_crop(image: DynamicImage, config: &CropConfig) -> DynamicImage {
    if !config.is_enabled() {
        return image;
    }

    let mut result = image;
    if config.mode.crops_margins() {
        result = crop_margins(result, config.power);
    }
    if config.mode.crops_page_number() {
        result = crop_page_number(result, config.power);
    }
    result
}
