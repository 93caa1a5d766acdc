//! Intensity normalization to 8-bit.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use super::grid::Frame;

/// Display window in modality units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub center: f64,
    pub width: f64,
}

impl Window {
    pub fn new(center: f64, width: f64) -> Self {
        Self { center, width }
    }

    /// `[lower, upper]` bounds, or `None` when the width is not positive.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        (self.width > 0.0 && self.width.is_finite() && self.center.is_finite()).then(|| {
            let half = self.width / 2.0;
            (self.center - half, self.center + half)
        })
    }
}

/// Map a frame to 8-bit gray.
///
/// With a usable window, values are clipped to `[c - w/2, c + w/2]` and
/// stretched over `0..=255`. Otherwise the frame's own min/max range is
/// stretched. A flat frame maps to all zeros.
pub fn normalize(frame: &Frame, window: Option<Window>) -> GrayImage {
    let range = window
        .and_then(|w| w.bounds())
        .or_else(|| frame.min_max().map(|(lo, hi)| (lo as f64, hi as f64)));

    let scale = |v: f32| -> u8 {
        match range {
            Some((lo, hi)) if hi > lo => {
                let clipped = (v as f64).clamp(lo, hi);
                ((clipped - lo) / (hi - lo) * 255.0).round() as u8
            }
            _ => 0,
        }
    };

    let columns = frame.columns;
    GrayImage::from_fn(frame.columns as u32, frame.rows as u32, |x, y| {
        let v = frame.data[y as usize * columns + x as usize];
        Luma([scale(v)])
    })
}
