use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::filter::box_filter;

pub const CONTENT: u8 = 255;
pub const BACKGROUND: u8 = 0;

const EDGE_STRIP_RATIO: f32 = 0.02;
const EDGE_NOISE_MAX_RATIO: f32 = 0.02;
const AUTOCONTRAST_CUTOFF_PERCENT: u64 = 1;
const CORNER_INSET: u32 = 5;

/// Half-open pixel rectangle: `x0..x1` by `y0..y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }
}

/// Binarized view of a page where background is always bright in `gray`
/// and content pixels are `CONTENT` in `mask`.
#[derive(Debug, Clone)]
pub struct ContentMask {
    pub gray: GrayImage,
    pub mask: GrayImage,
    pub threshold: u8,
    pub bounding_box: Option<BoundingBox>,
}

pub fn threshold_from_power(power: f32) -> u8 {
    (240.0 - power * 64.0).trunc().clamp(0.0, 255.0) as u8
}

pub fn build_content_mask(image: &DynamicImage, power: f32) -> ContentMask {
    let mut gray = image.to_luma8();
    if !has_light_background(&gray) {
        image::imageops::invert(&mut gray);
    }

    let gray = box_filter(&autocontrast(&gray), 1, 1);
    let threshold = threshold_from_power(power);

    let mut mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y)[0] <= threshold {
            Luma([CONTENT])
        } else {
            Luma([BACKGROUND])
        }
    });
    suppress_edge_noise(&mut mask);
    let bounding_box = content_bounds(&mask);

    ContentMask {
        gray,
        mask,
        threshold,
        bounding_box,
    }
}

pub fn has_light_background(gray: &GrayImage) -> bool {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return true;
    }

    let near_x = CORNER_INSET.min(width - 1);
    let near_y = CORNER_INSET.min(height - 1);
    let far_x = width.saturating_sub(CORNER_INSET + 1);
    let far_y = height.saturating_sub(CORNER_INSET + 1);

    let sum: u32 = [
        (near_x, near_y),
        (far_x, near_y),
        (near_x, far_y),
        (far_x, far_y),
    ]
    .iter()
    .map(|&(x, y)| gray.get_pixel(x, y)[0] as u32)
    .sum();

    sum as f32 / 4.0 > 128.0
}

pub fn autocontrast(gray: &GrayImage) -> GrayImage {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    let cut = total * AUTOCONTRAST_CUTOFF_PERCENT / 100;

    let mut remaining = cut;
    for bin in histogram.iter_mut() {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(*bin);
        *bin -= taken;
        remaining -= taken;
    }
    let mut remaining = cut;
    for bin in histogram.iter_mut().rev() {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(*bin);
        *bin -= taken;
        remaining -= taken;
    }

    let low = histogram.iter().position(|&count| count > 0);
    let high = histogram.iter().rposition(|&count| count > 0);
    let (low, high) = match (low, high) {
        (Some(low), Some(high)) if high > low => (low as i32, high as i32),
        _ => return gray.clone(),
    };

    let mut lut = [0u8; 256];
    for (index, entry) in lut.iter_mut().enumerate() {
        let stretched = (index as i32 - low) * 255 / (high - low);
        *entry = stretched.clamp(0, 255) as u8;
    }

    let mut output = gray.clone();
    for pixel in output.pixels_mut() {
        pixel[0] = lut[pixel[0] as usize];
    }
    output
}

fn suppress_edge_noise(mask: &mut GrayImage) {
    let (width, height) = mask.dimensions();
    let strip_h = (EDGE_STRIP_RATIO * height as f32) as u32;
    let strip_w = (EDGE_STRIP_RATIO * width as f32) as u32;
    let far_y = ((1.0 - EDGE_STRIP_RATIO) * height as f32) as u32;
    let far_x = ((1.0 - EDGE_STRIP_RATIO) * width as f32) as u32;

    let strips = [
        (0, 0, width, strip_h),
        (0, far_y, width, height),
        (0, 0, strip_w, height),
        (far_x, 0, width, height),
    ];

    for (x0, y0, x1, y1) in strips {
        if x1 <= x0 || y1 <= y0 {
            continue;
        }
        let area = ((x1 - x0) * (y1 - y0)) as f32;
        let mut content = 0u32;
        for y in y0..y1 {
            for x in x0..x1 {
                if mask.get_pixel(x, y)[0] == CONTENT {
                    content += 1;
                }
            }
        }

        let ratio = content as f32 / area;
        if ratio > 0.0 && ratio < EDGE_NOISE_MAX_RATIO {
            for y in y0..y1 {
                for x in x0..x1 {
                    mask.put_pixel(x, y, Luma([BACKGROUND]));
                }
            }
        }
    }
}

pub fn content_bounds(mask: &GrayImage) -> Option<BoundingBox> {
    let mut bbox: Option<BoundingBox> = None;

    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] != CONTENT {
            continue;
        }
        bbox = Some(match bbox {
            None => BoundingBox {
                x0: x,
                y0: y,
                x1: x + 1,
                y1: y + 1,
            },
            Some(mut current) => {
                current.x0 = current.x0.min(x);
                current.y0 = current.y0.min(y);
                current.x1 = current.x1.max(x + 1);
                current.y1 = current.y1.max(y + 1);
                current
            }
        });
    }

    bbox
}

pub fn crop_to(image: &DynamicImage, bbox: BoundingBox) -> DynamicImage {
    let (width, height) = image.dimensions();
    let x1 = bbox.x1.min(width);
    let y1 = bbox.y1.min(height);
    if x1 <= bbox.x0 || y1 <= bbox.y0 {
        return image.clone();
    }
    image.crop_imm(bbox.x0, bbox.y0, x1 - bbox.x0, y1 - bbox.y0)
}
