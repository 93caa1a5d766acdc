//! Spatial filters on 8-bit gray images.
//!
//! Neighbourhood filters replicate edge pixels at the border.

use std::fmt;

use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sigma equivalent to a 5x5 Gaussian kernel with automatic sigma
const GAUSSIAN_SIGMA: f32 = 1.1;
const MEDIAN_RADIUS: i64 = 2;
const BILATERAL_RADIUS: i64 = 4;
const BILATERAL_SIGMA_COLOR: f32 = 75.0;
const BILATERAL_SIGMA_SPACE: f32 = 75.0;
const EDGE_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Closed set of spatial filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterType {
    Gaussian,
    Median,
    Bilateral,
    EdgeEnhance,
}

impl FilterType {
    pub const ALL: [FilterType; 4] = [
        FilterType::Gaussian,
        FilterType::Median,
        FilterType::Bilateral,
        FilterType::EdgeEnhance,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterType::Gaussian => "gaussian",
            FilterType::Median => "median",
            FilterType::Bilateral => "bilateral",
            FilterType::EdgeEnhance => "edge_enhance",
        }
    }
}

impl fmt::Display for FilterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a user-supplied name, warning and returning `None` if unknown.
pub fn resolve_filter(name: &str) -> Option<FilterType> {
    let resolved = FilterType::from_name(name);
    if resolved.is_none() {
        warn!(filter = name, "unknown filter type, skipping");
    }
    resolved
}

pub fn apply_filter(img: &GrayImage, filter: FilterType) -> GrayImage {
    match filter {
        FilterType::Gaussian => imageops::blur(img, GAUSSIAN_SIGMA),
        FilterType::Median => median(img, MEDIAN_RADIUS),
        FilterType::Bilateral => bilateral(
            img,
            BILATERAL_RADIUS,
            BILATERAL_SIGMA_COLOR,
            BILATERAL_SIGMA_SPACE,
        ),
        FilterType::EdgeEnhance => convolve3x3(img, &EDGE_KERNEL),
    }
}

/// Name-based entry point: unknown names return the input unchanged.
pub fn apply_filter_by_name(img: &GrayImage, name: &str) -> GrayImage {
    match resolve_filter(name) {
        Some(filter) => apply_filter(img, filter),
        None => img.clone(),
    }
}

/// Pixel at `(x, y)` with coordinates clamped into the image.
#[inline]
fn sample(img: &GrayImage, x: i64, y: i64) -> u8 {
    let (w, h) = img.dimensions();
    let x = x.clamp(0, w as i64 - 1) as u32;
    let y = y.clamp(0, h as i64 - 1) as u32;
    img.get_pixel(x, y).0[0]
}

fn median(img: &GrayImage, radius: i64) -> GrayImage {
    let side = (2 * radius + 1) as usize;
    let mut window = Vec::with_capacity(side * side);

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        window.clear();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                window.push(sample(img, x as i64 + dx, y as i64 + dy));
            }
        }
        let mid = window.len() / 2;
        let (_, median, _) = window.select_nth_unstable(mid);
        Luma([*median])
    })
}

fn bilateral(img: &GrayImage, radius: i64, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    let color_weights: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    // Circular neighbourhood of the given radius
    let offsets: Vec<(i64, i64, f32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|(dx, dy)| dx * dx + dy * dy <= radius * radius)
        .map(|(dx, dy)| (dx, dy, ((dx * dx + dy * dy) as f32 * space_coeff).exp()))
        .collect();

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let center = img.get_pixel(x, y).0[0];
        let mut sum = 0.0f32;
        let mut norm = 0.0f32;
        for &(dx, dy, space_weight) in &offsets {
            let v = sample(img, x as i64 + dx, y as i64 + dy);
            let w = space_weight * color_weights[center.abs_diff(v) as usize];
            sum += w * v as f32;
            norm += w;
        }
        Luma([(sum / norm).round().clamp(0.0, 255.0) as u8])
    })
}

fn convolve3x3(img: &GrayImage, kernel: &[f32; 9]) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let mut acc = 0.0f32;
        for (i, k) in kernel.iter().enumerate() {
            let dx = (i % 3) as i64 - 1;
            let dy = (i / 3) as i64 - 1;
            acc += k * sample(img, x as i64 + dx, y as i64 + dy) as f32;
        }
        Luma([acc.round().clamp(0.0, 255.0) as u8])
    })
}
