//! Resizing to a target canvas.

use std::fmt;

use image::{imageops, GrayImage};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Output dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    /// Create a target size; both dimensions must be non-zero.
    pub fn new(width: u32, height: u32) -> Result<Self, PipelineError> {
        if width == 0 || height == 0 {
            return Err(PipelineError::InvalidRequest(format!(
                "target size must be non-zero, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Resize `img` to exactly `target`.
///
/// With `maintain_aspect`, the image is scaled to fit inside the target and
/// centered on a black canvas; otherwise it is stretched.
pub fn resize(img: &GrayImage, target: TargetSize, maintain_aspect: bool) -> GrayImage {
    let (width, height) = img.dimensions();
    if (width, height) == (target.width, target.height) {
        return img.clone();
    }
    if width == 0 || height == 0 {
        return GrayImage::new(target.width, target.height);
    }

    if !maintain_aspect {
        return imageops::resize(
            img,
            target.width,
            target.height,
            imageops::FilterType::Lanczos3,
        );
    }

    let scale = f64::min(
        target.width as f64 / width as f64,
        target.height as f64 / height as f64,
    );
    let fit_w = ((width as f64 * scale).round() as u32).clamp(1, target.width);
    let fit_h = ((height as f64 * scale).round() as u32).clamp(1, target.height);
    let fitted = imageops::resize(img, fit_w, fit_h, imageops::FilterType::Lanczos3);

    let mut canvas = GrayImage::new(target.width, target.height);
    let x = (target.width - fit_w) / 2;
    let y = (target.height - fit_h) / 2;
    imageops::replace(&mut canvas, &fitted, x as i64, y as i64);
    canvas
}
