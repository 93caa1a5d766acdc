//! Raster encoding.
//!
//! Normalized 8-bit gray images are written as PNG, JPEG, TIFF or BMP.
//!
//! # Design Decisions
//!
//! - **Closed format set**: [`OutputFormat`] parses only the four supported
//!   names (case-insensitive); anything else, WEBP included, is an
//!   `UnsupportedFormat` error at the request boundary.
//!
//! - **Quality applies to JPEG only**: the lossless formats ignore it.

use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

use super::resize::{resize, TargetSize};

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// JPEG quality used for thumbnails.
pub const DEFAULT_THUMBNAIL_QUALITY: u8 = 85;

/// Default thumbnail edge length.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

pub const MIN_JPEG_QUALITY: u8 = 1;
pub const MAX_JPEG_QUALITY: u8 = 100;

// =============================================================================
// Output Format
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputFormat {
    Png,
    Jpeg,
    Tiff,
    Bmp,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Tiff => "TIFF",
            OutputFormat::Bmp => "BMP",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Bmp => "bmp",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PNG" => Ok(OutputFormat::Png),
            "JPEG" => Ok(OutputFormat::Jpeg),
            "TIFF" => Ok(OutputFormat::Tiff),
            "BMP" => Ok(OutputFormat::Bmp),
            _ => Err(PipelineError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a gray image in `format`. `quality` only affects JPEG.
pub fn encode(img: &GrayImage, format: OutputFormat, quality: u8) -> Result<Bytes, PipelineError> {
    let encode_err = |e: image::ImageError| PipelineError::Encode {
        message: e.to_string(),
    };

    let mut output = Vec::new();
    match format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut output, clamp_quality(quality));
            encoder.encode_image(img).map_err(encode_err)?;
        }
        OutputFormat::Png => img
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(encode_err)?,
        OutputFormat::Tiff => img
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Tiff)
            .map_err(encode_err)?,
        OutputFormat::Bmp => img
            .write_to(&mut Cursor::new(&mut output), ImageFormat::Bmp)
            .map_err(encode_err)?,
    }

    Ok(Bytes::from(output))
}

/// Aspect-preserving thumbnail encoded as JPEG.
pub fn make_thumbnail(img: &GrayImage, size: TargetSize, quality: u8) -> Result<Bytes, PipelineError> {
    let thumb = resize(img, size, true);
    encode(&thumb, OutputFormat::Jpeg, quality)
}

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to the valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
