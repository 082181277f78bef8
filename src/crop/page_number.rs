use image::{DynamicImage, GenericImageView};
use tracing::debug;

use super::mask::build_content_mask;

// Footprint limits of a printed page number, as fractions of (width, height).
// Empirically tuned; keep them in sync with each other.
const MAX_MARK_SIZE: (f32, f32) = (0.015 * 3.0, 0.02);
const MIN_MARK_SIZE: (f32, f32) = (0.003, 0.006);
const MIN_MARK_MAX_HEIGHT_PX: f32 = 3.0;
const WINDOW_HEIGHT_RATIO: f32 = MAX_MARK_SIZE.1 * 1.25;
const MERGE_DISTANCE: (f32, f32) = (0.01, 0.002);

/// Inclusive box in scan-window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MarkBox {
    left: u32,
    right: u32,
    top: u32,
    bottom: u32,
}

impl MarkBox {
    fn width(&self) -> u32 {
        self.right - self.left
    }

    fn height(&self) -> u32 {
        self.bottom - self.top
    }

    fn is_near(&self, other: &MarkBox, tolerance: (f32, f32)) -> bool {
        let (tx, ty) = tolerance;
        !(other.left as f32 - tx > self.right as f32
            || other.right as f32 + tx < self.left as f32
            || other.top as f32 - ty > self.bottom as f32
            || other.bottom as f32 + ty < self.top as f32)
    }

    fn union(&self, other: &MarkBox) -> MarkBox {
        MarkBox {
            left: self.left.min(other.left),
            right: self.right.max(other.right),
            top: self.top.min(other.top),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Removes a lone page number printed under the page content.
///
/// The page is left alone unless exactly one small mark sits on the bottom
/// edge of the content box. Two or more candidates are treated as artwork.
pub fn crop_page_number(image: DynamicImage, power: f32) -> DynamicImage {
    if power <= 0.0 {
        return image;
    }

    let (width, height) = image.dimensions();
    let content = build_content_mask(&image, power);
    let Some(bbox) = content.bounding_box else {
        return image;
    };

    let window_h = (WINDOW_HEIGHT_RATIO * height as f32) as u32;
    if window_h == 0 {
        return image;
    }
    let window_top = bbox.y1.saturating_sub(window_h);
    let window_rows = bbox.y1 - window_top;

    let tolerance = (
        width as f32 * MERGE_DISTANCE.0,
        height as f32 * MERGE_DISTANCE.1,
    );

    let mut segments = Vec::new();
    for row in 0..window_rows {
        let y = window_top + row;
        let columns = (bbox.x0..bbox.x1)
            .filter(|&x| content.gray.get_pixel(x, y)[0] <= content.threshold);
        for (left, right) in group_close_values(columns, tolerance.0) {
            segments.push(MarkBox {
                left,
                right,
                top: row,
                bottom: row,
            });
        }
    }
    if segments.is_empty() {
        return image;
    }

    let min_size = (
        width as f32 * MIN_MARK_SIZE.0,
        height as f32 * MIN_MARK_SIZE.1,
    );
    let boxes: Vec<MarkBox> = merge_boxes(segments, tolerance)
        .into_iter()
        .filter(|b| b.width() as f32 >= min_size.0 && b.height() as f32 >= min_size.1)
        .collect();

    let last_row = window_rows - 1;
    let Some(min_top) = boxes
        .iter()
        .filter(|b| b.bottom == last_row)
        .map(|b| b.top)
        .min()
    else {
        return image;
    };

    let in_range: Vec<&MarkBox> = boxes.iter().filter(|b| b.bottom >= min_top).collect();
    let max_size = (
        width as f32 * MAX_MARK_SIZE.0,
        (height as f32 * MAX_MARK_SIZE.1).max(MIN_MARK_MAX_HEIGHT_PX),
    );

    let [mark] = in_range.as_slice() else {
        debug!(candidates = in_range.len(), "page number ambiguous, keeping page");
        return image;
    };
    if mark.width() as f32 > max_size.0 || mark.height() as f32 > max_size.1 {
        return image;
    }

    let crop_y = (window_top + mark.top).saturating_sub(1);
    if crop_y == 0 {
        return image;
    }

    debug!(
        mark_top = window_top + mark.top,
        new_height = crop_y,
        "cropping page number"
    );
    image.crop_imm(0, 0, width, crop_y)
}

fn group_close_values(values: impl IntoIterator<Item = u32>, max_gap: f32) -> Vec<(u32, u32)> {
    let mut groups = Vec::new();
    let mut current: Option<(u32, u32)> = None;

    for value in values {
        current = match current {
            None => Some((value, value)),
            Some((start, end)) if (value - end) as f32 <= max_gap => Some((start, value)),
            Some(finished) => {
                groups.push(finished);
                Some((value, value))
            }
        };
    }
    if let Some(last) = current {
        groups.push(last);
    }

    groups
}

fn merge_boxes(boxes: Vec<MarkBox>, tolerance: (f32, f32)) -> Vec<MarkBox> {
    let mut settled: Vec<MarkBox> = Vec::with_capacity(boxes.len());
    let mut pending = boxes;

    while let Some(mut current) = pending.pop() {
        let mut grew = false;
        let mut index = 0;
        while index < settled.len() {
            if current.is_near(&settled[index], tolerance) {
                current = current.union(&settled.swap_remove(index));
                grew = true;
            } else {
                index += 1;
            }
        }

        if grew {
            // The larger box may now reach boxes it was checked against.
            pending.push(current);
        } else {
            settled.push(current);
        }
    }

    settled
}
