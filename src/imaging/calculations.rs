//! Pure calculation functions for output dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Output size chosen by [`plan_resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetDimensions {
    pub width: u32,
    pub height: u32,
}

impl TargetDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when these dimensions equal `(width, height)` and no resample is needed.
    pub fn matches(&self, (width, height): (u32, u32)) -> bool {
        self.width == width && self.height == height
    }
}

/// Calculate the output dimensions for a source image under a maximum-dimension bound.
///
/// A `max_dimension` of 0 disables resizing, as does a source that already
/// fits. Otherwise the bound is applied in two passes:
///
/// 1. If the width exceeds the bound, clamp it and derive the height from the width ratio.
/// 2. If the (possibly already reduced) height still exceeds the bound, clamp it
///    and derive the width from the height ratio.
///
/// Each derived side is floored, not rounded. Pass order and flooring both
/// affect the exact result and must stay as they are to reproduce existing
/// outputs. A derived side that floors to zero is kept at one pixel.
///
/// # Examples
/// ```
/// # use blob_squeeze::imaging::{plan_resize, TargetDimensions};
/// // Width clamped first, height follows: 2000 * (1024 / 4000) = 512
/// assert_eq!(plan_resize(4000, 2000, 1024), TargetDimensions::new(1024, 512));
///
/// // Width already fits, height clamped: 800 * (1024 / 2400) = 341.33 → 341
/// assert_eq!(plan_resize(800, 2400, 1024), TargetDimensions::new(341, 1024));
/// ```
pub fn plan_resize(source_w: u32, source_h: u32, max_dimension: u32) -> TargetDimensions {
    if max_dimension == 0 || (source_w <= max_dimension && source_h <= max_dimension) {
        return TargetDimensions::new(source_w, source_h);
    }

    let mut width = source_w;
    let mut height = source_h;

    if width > max_dimension {
        let width_before = width;
        width = max_dimension;
        height = scale_floor(height, width, width_before);
    }
    if height > max_dimension {
        let height_before = height;
        height = max_dimension;
        width = scale_floor(width, height, height_before);
    }

    TargetDimensions::new(width, height)
}

/// `floor(other * (new / old))`, evaluated in f64 in that order, never below 1.
fn scale_floor(other: u32, new: u32, old: u32) -> u32 {
    let scaled = (other as f64 * (new as f64 / old as f64)).floor() as u32;
    scaled.max(1)
}
