use crate::pipeline::types::{NormalizedBox, Offset, PixelBox};
use opencv::core::Rect;

/// Scale a normalized box to pixel coordinates, truncating toward zero.
pub fn normalized_to_pixel(bbox: &NormalizedBox, width: i32, height: i32) -> PixelBox {
    let w = width as f32;
    let h = height as f32;
    PixelBox {
        x1: (bbox.x1 * w) as i32,
        y1: (bbox.y1 * h) as i32,
        x2: (bbox.x2 * w) as i32,
        y2: (bbox.y2 * h) as i32,
    }
}

/// Raise negative coordinates to zero. No upper bound is applied, so a box
/// may still extend past the right or bottom image edge.
pub fn clamp_non_negative(bbox: PixelBox) -> PixelBox {
    PixelBox {
        x1: bbox.x1.max(0),
        y1: bbox.y1.max(0),
        x2: bbox.x2.max(0),
        y2: bbox.y2.max(0),
    }
}

/// Shift both corners by `offset` (crop-local to frame-global). `None` if a
/// coordinate leaves the `i32` range.
pub fn translate(bbox: PixelBox, offset: Offset) -> Option<PixelBox> {
    Some(PixelBox {
        x1: bbox.x1.checked_add(offset.dx)?,
        y1: bbox.y1.checked_add(offset.dy)?,
        x2: bbox.x2.checked_add(offset.dx)?,
        y2: bbox.y2.checked_add(offset.dy)?,
    })
}

/// Convert a right/bottom-exclusive box to the inclusive convention.
/// Must be applied exactly once per detection. `None` if the right or
/// bottom edge is already at `i32::MAX`.
pub fn expand_inclusive(bbox: PixelBox) -> Option<PixelBox> {
    Some(PixelBox {
        x2: bbox.x2.checked_add(1)?,
        y2: bbox.y2.checked_add(1)?,
        ..bbox
    })
}

/// Intersect an inclusive box with the image bounds, returning the OpenCV ROI
/// to materialise. `None` when nothing of the box lies inside the image.
pub fn clip_to_image(bbox: &PixelBox, width: i32, height: i32) -> Option<Rect> {
    let x1 = bbox.x1.max(0);
    let y1 = bbox.y1.max(0);
    // Inclusive corner -> exclusive edge, then clip.
    let x2 = bbox.x2.saturating_add(1).min(width);
    let y2 = bbox.y2.saturating_add(1).min(height);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
}
