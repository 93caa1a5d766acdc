//! Contrast enhancement on 8-bit gray images.
//!
//! | name           | method                                         |
//! |----------------|------------------------------------------------|
//! | `clahe`        | CLAHE, clip limit 2.0, 8x8 tiles               |
//! | `histogram_eq` | global histogram equalization                  |
//! | `gamma`        | gamma 1.2 (`out = 255 * (in/255)^(1/1.2)`)     |
//! | `adaptive_eq`  | CLAHE with a higher clip limit (2.56)          |
//! | `unsharp_mask` | unsharp mask, sigma 1.0, no threshold          |

use std::fmt;

use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::warn;

const CLAHE_CLIP_LIMIT: f32 = 2.0;
const ADAPTIVE_CLIP_LIMIT: f32 = 2.56;
const CLAHE_GRID: u32 = 8;
const GAMMA: f64 = 1.2;
const UNSHARP_SIGMA: f32 = 1.0;

/// Closed set of enhancement methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Enhancement {
    Clahe,
    HistogramEq,
    Gamma,
    AdaptiveEq,
    UnsharpMask,
}

impl Enhancement {
    pub const ALL: [Enhancement; 5] = [
        Enhancement::Clahe,
        Enhancement::HistogramEq,
        Enhancement::Gamma,
        Enhancement::AdaptiveEq,
        Enhancement::UnsharpMask,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Enhancement::Clahe => "clahe",
            Enhancement::HistogramEq => "histogram_eq",
            Enhancement::Gamma => "gamma",
            Enhancement::AdaptiveEq => "adaptive_eq",
            Enhancement::UnsharpMask => "unsharp_mask",
        }
    }
}

impl fmt::Display for Enhancement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a user-supplied name, warning and returning `None` if unknown.
pub fn resolve_enhancement(name: &str) -> Option<Enhancement> {
    let resolved = Enhancement::from_name(name);
    if resolved.is_none() {
        warn!(enhancement = name, "unknown enhancement method, skipping");
    }
    resolved
}

pub fn enhance(img: &GrayImage, method: Enhancement) -> GrayImage {
    match method {
        Enhancement::Clahe => clahe(img, CLAHE_CLIP_LIMIT, CLAHE_GRID),
        Enhancement::HistogramEq => equalize_histogram(img),
        Enhancement::Gamma => gamma(img, GAMMA),
        Enhancement::AdaptiveEq => clahe(img, ADAPTIVE_CLIP_LIMIT, CLAHE_GRID),
        Enhancement::UnsharpMask => imageops::unsharpen(img, UNSHARP_SIGMA, 0),
    }
}

/// Name-based entry point: unknown names return the input unchanged.
pub fn enhance_by_name(img: &GrayImage, name: &str) -> GrayImage {
    match resolve_enhancement(name) {
        Some(method) => enhance(img, method),
        None => img.clone(),
    }
}

// =============================================================================
// Methods
// =============================================================================

fn histogram(pixels: impl Iterator<Item = u8>) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for p in pixels {
        hist[p as usize] += 1;
    }
    hist
}

fn apply_lut(img: &GrayImage, lut: &[u8; 256]) -> GrayImage {
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

/// Global histogram equalization. A single-valued image is returned unchanged.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let hist = histogram(img.pixels().map(|p| p.0[0]));
    let total: u64 = hist.iter().map(|&c| c as u64).sum();

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (i, &count) in hist.iter().enumerate() {
        running += count as u64;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    if total <= cdf_min {
        return img.clone();
    }

    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let scaled = cdf[i].saturating_sub(cdf_min) as f64 / (total - cdf_min) as f64;
        *entry = (scaled * 255.0).round() as u8;
    }
    apply_lut(img, &lut)
}

pub fn gamma(img: &GrayImage, gamma: f64) -> GrayImage {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = (255.0 * (i as f64 / 255.0).powf(1.0 / gamma)).round() as u8;
    }
    apply_lut(img, &lut)
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into at most `grid x grid` tiles. Each tile's histogram
/// is clipped at `clip_limit * tile_area / 256` with the excess redistributed
/// evenly, and pixels are mapped by bilinear interpolation between the four
/// nearest tile mappings.
pub fn clahe(img: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 || grid == 0 {
        return img.clone();
    }

    let tile_w = width.div_ceil(grid.min(width));
    let tile_h = height.div_ceil(grid.min(height));
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            let pixels = (y0..y1).flat_map(|y| (x0..x1).map(move |x| img.get_pixel(x, y).0[0]));
            luts.push(clipped_lut(histogram(pixels), (x1 - x0) * (y1 - y0), clip_limit));
        }
    }

    let lut_at = |tx: u32, ty: u32| &luts[(ty * tiles_x + tx) as usize];
    let neighbours = |pos: u32, tile: u32, tiles: u32| -> (u32, u32, f32) {
        let f = (pos as f32 + 0.5) / tile as f32 - 0.5;
        let t0 = (f.floor().max(0.0) as u32).min(tiles - 1);
        let t1 = (t0 + 1).min(tiles - 1);
        let a = (f - t0 as f32).clamp(0.0, 1.0);
        (t0, t1, a)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let v = img.get_pixel(x, y).0[0] as usize;
        let (tx0, tx1, ax) = neighbours(x, tile_w, tiles_x);
        let (ty0, ty1, ay) = neighbours(y, tile_h, tiles_y);

        let top = lut_at(tx0, ty0)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty0)[v] as f32 * ax;
        let bottom = lut_at(tx0, ty1)[v] as f32 * (1.0 - ax) + lut_at(tx1, ty1)[v] as f32 * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_lut(mut hist: [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }
    let share = excess / 256;
    let residual = (excess % 256) as usize;
    for count in hist.iter_mut() {
        *count += share;
    }
    if residual > 0 {
        // Spread the leftover across the whole range, not just the low bins
        let step = (256 / residual).max(1);
        for count in hist.iter_mut().step_by(step).take(residual) {
            *count += 1;
        }
    }

    let mut lut = [0u8; 256];
    let mut running = 0u64;
    for (i, &count) in hist.iter().enumerate() {
        running += count as u64;
        lut[i] = ((running as f64 * 255.0 / area.max(1) as f64).round()).min(255.0) as u8;
    }
    lut
}
