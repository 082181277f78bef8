use image::DynamicImage;
use tracing::debug;

use super::mask::{build_content_mask, crop_to};

/// Removes the uniform background border around the page content.
///
/// `power` in `[0, 3]` lowers the binarization threshold as it grows, so more
/// faint pixels count as content. A non-positive power returns the input.
pub fn crop_margins(image: DynamicImage, power: f32) -> DynamicImage {
    if power <= 0.0 {
        return image;
    }

    let mask = build_content_mask(&image, power);
    match mask.bounding_box {
        Some(bbox) => {
            debug!(
                x = bbox.x0,
                y = bbox.y0,
                width = bbox.width(),
                height = bbox.height(),
                "cropping margins"
            );
            crop_to(&image, bbox)
        }
        None => image,
    }
}
