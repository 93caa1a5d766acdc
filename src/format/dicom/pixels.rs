//! Native (uncompressed) pixel data decoding.
//!
//! Samples are decoded to `f32` stored values, one luminance value per pixel,
//! laid out frame-major then row-major: `data[(frame * rows + row) * columns + col]`.
//! Modality rescale and MONOCHROME1 inversion are applied later by the pipeline.

use crate::error::DicomError;
use crate::io::ByteOrder;

use super::parser::DataSet;
use super::tags::Tag;

/// Rec. 601 luma weights used to collapse RGB samples to one channel
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Number of Frames is an IS, a signed 32-bit integer string
const MAX_FRAMES: f64 = i32::MAX as f64;

// =============================================================================
// Photometric Interpretation
// =============================================================================

/// Photometric interpretation of the stored samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Photometric {
    /// Minimum sample value displays as white
    Monochrome1,
    /// Minimum sample value displays as black
    Monochrome2,
    Rgb,
    YbrFull,
    PaletteColor,
    Other(String),
}

impl Photometric {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "MONOCHROME1" => Photometric::Monochrome1,
            "MONOCHROME2" => Photometric::Monochrome2,
            "RGB" => Photometric::Rgb,
            "YBR_FULL" | "YBR_FULL_422" => Photometric::YbrFull,
            "PALETTE COLOR" => Photometric::PaletteColor,
            other => Photometric::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Photometric::Monochrome1 => "MONOCHROME1",
            Photometric::Monochrome2 => "MONOCHROME2",
            Photometric::Rgb => "RGB",
            Photometric::YbrFull => "YBR_FULL",
            Photometric::PaletteColor => "PALETTE COLOR",
            Photometric::Other(s) => s,
        }
    }

    /// Whether stored values must be inverted for display.
    #[inline]
    pub fn requires_inversion(&self) -> bool {
        matches!(self, Photometric::Monochrome1)
    }
}

impl Default for Photometric {
    fn default() -> Self {
        Photometric::Monochrome2
    }
}

// =============================================================================
// Pixel Layout
// =============================================================================

/// Image Pixel module attributes needed to decode Pixel Data.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelLayout {
    pub rows: usize,
    pub columns: usize,
    pub frames: usize,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub signed: bool,
    /// 0 = interleaved (R1G1B1R2...), 1 = planar (R...G...B...)
    pub planar_configuration: u16,
    pub photometric: Photometric,
}

impl PixelLayout {
    /// Read and validate the pixel module of a data set.
    pub fn from_dataset(dataset: &DataSet) -> Result<Self, DicomError> {
        let rows = dataset
            .u16(Tag::ROWS)
            .ok_or_else(|| DicomError::UnsupportedPixelLayout("missing Rows".to_string()))?
            as usize;
        let columns = dataset
            .u16(Tag::COLUMNS)
            .ok_or_else(|| DicomError::UnsupportedPixelLayout("missing Columns".to_string()))?
            as usize;
        if rows == 0 || columns == 0 {
            return Err(DicomError::UnsupportedPixelLayout(format!(
                "empty image {}x{}",
                columns, rows
            )));
        }

        let frames = match dataset.number(Tag::NUMBER_OF_FRAMES) {
            None => 1,
            Some(n) if n.is_finite() && n >= 1.0 && n.fract() == 0.0 && n <= MAX_FRAMES => {
                n as usize
            }
            Some(n) => {
                return Err(DicomError::UnsupportedPixelLayout(format!(
                    "invalid number of frames {}",
                    n
                )))
            }
        };

        let samples_per_pixel = dataset.u16(Tag::SAMPLES_PER_PIXEL).unwrap_or(1);
        if samples_per_pixel != 1 && samples_per_pixel != 3 {
            return Err(DicomError::UnsupportedPixelLayout(format!(
                "{} samples per pixel",
                samples_per_pixel
            )));
        }

        let bits_allocated = dataset.u16(Tag::BITS_ALLOCATED).unwrap_or(16);
        if !matches!(bits_allocated, 8 | 16 | 32) {
            return Err(DicomError::UnsupportedPixelLayout(format!(
                "{} bits allocated",
                bits_allocated
            )));
        }

        let bits_stored = dataset.u16(Tag::BITS_STORED).unwrap_or(bits_allocated);
        if bits_stored == 0 || bits_stored > bits_allocated {
            return Err(DicomError::UnsupportedPixelLayout(format!(
                "{} bits stored in {} bits allocated",
                bits_stored, bits_allocated
            )));
        }

        let photometric = dataset
            .string(Tag::PHOTOMETRIC_INTERPRETATION)
            .map(|s| Photometric::parse(&s))
            .unwrap_or_default();

        let layout = PixelLayout {
            rows,
            columns,
            frames,
            samples_per_pixel,
            bits_allocated,
            bits_stored,
            signed: dataset.u16(Tag::PIXEL_REPRESENTATION) == Some(1),
            planar_configuration: dataset.u16(Tag::PLANAR_CONFIGURATION).unwrap_or(0),
            photometric,
        };
        layout.checked_len()?;
        Ok(layout)
    }

    #[inline]
    pub fn pixels_per_frame(&self) -> usize {
        self.rows * self.columns
    }

    #[inline]
    pub fn bytes_per_sample(&self) -> usize {
        self.bits_allocated as usize / 8
    }

    /// Exact number of Pixel Data bytes the layout requires, or `None` if
    /// the product does not fit in a `usize`.
    pub fn expected_len(&self) -> Option<u64> {
        self.rows
            .checked_mul(self.columns)?
            .checked_mul(self.frames)?
            .checked_mul(self.samples_per_pixel as usize)?
            .checked_mul(self.bytes_per_sample())
            .map(|len| len as u64)
    }

    fn checked_len(&self) -> Result<u64, DicomError> {
        self.expected_len().ok_or_else(|| {
            DicomError::UnsupportedPixelLayout(format!(
                "{} frames of {}x{} overflow the addressable size",
                self.frames, self.columns, self.rows
            ))
        })
    }
}

// =============================================================================
// Sample Decoding
// =============================================================================

/// Decode native Pixel Data into one `f32` stored value per pixel.
///
/// Extra trailing bytes (odd-length padding) are ignored; missing bytes are
/// an error.
pub fn decode_samples(
    layout: &PixelLayout,
    data: &[u8],
    byte_order: ByteOrder,
) -> Result<Vec<f32>, DicomError> {
    let expected = layout.checked_len()?;
    if (data.len() as u64) < expected {
        return Err(DicomError::PixelDataTruncated {
            expected,
            actual: data.len() as u64,
        });
    }

    let width = layout.bytes_per_sample();
    let sample_count = expected as usize / width;
    let mask: u32 = if layout.bits_stored >= 32 {
        u32::MAX
    } else {
        (1u32 << layout.bits_stored) - 1
    };
    let sign_bit = 1u32 << (layout.bits_stored - 1);

    let samples = (0..sample_count).map(|i| {
        let bytes = &data[i * width..(i + 1) * width];
        let raw = match width {
            1 => bytes[0] as u32,
            2 => byte_order.read_u16(bytes) as u32,
            _ => byte_order.read_u32(bytes),
        } & mask;

        if layout.signed && raw & sign_bit != 0 {
            (raw as i64 - (mask as i64 + 1)) as f32
        } else {
            raw as f32
        }
    });

    if layout.samples_per_pixel == 1 {
        return Ok(samples.collect());
    }

    let raw: Vec<f32> = samples.collect();
    Ok(collapse_color(layout, &raw))
}

/// Reduce three samples per pixel to a single luminance channel.
fn collapse_color(layout: &PixelLayout, raw: &[f32]) -> Vec<f32> {
    let per_frame = layout.pixels_per_frame();
    let luma_only = layout.photometric == Photometric::YbrFull;
    let mut out = Vec::with_capacity(per_frame * layout.frames);

    for frame in 0..layout.frames {
        let base = frame * per_frame * 3;
        for pixel in 0..per_frame {
            let channel = |c: usize| {
                if layout.planar_configuration == 1 {
                    raw[base + c * per_frame + pixel]
                } else {
                    raw[base + pixel * 3 + c]
                }
            };
            let value = if luma_only {
                channel(0)
            } else {
                LUMA_WEIGHTS[0] * channel(0)
                    + LUMA_WEIGHTS[1] * channel(1)
                    + LUMA_WEIGHTS[2] * channel(2)
            };
            out.push(value);
        }
    }
    out
}

// =============================================================================
// Tests
// =============================================================================
