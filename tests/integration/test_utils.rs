//! Test utilities for integration tests.
//!
//! This module provides a small DICOM Part 10 writer for building test files
//! with various transfer syntaxes, pixel layouts and header attributes.

use std::fs;
use std::path::{Path, PathBuf};

use image::GrayImage;

// =============================================================================
// Transfer Syntaxes
// =============================================================================

pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";
pub const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";
pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    ExplicitLittle,
    ImplicitLittle,
    ExplicitBig,
}

impl Encoding {
    fn for_uid(uid: &str) -> Self {
        match uid {
            IMPLICIT_VR_LITTLE_ENDIAN => Encoding::ImplicitLittle,
            EXPLICIT_VR_BIG_ENDIAN => Encoding::ExplicitBig,
            // Encapsulated syntaxes are written explicit little endian; the
            // reader must reject them before looking at the body.
            _ => Encoding::ExplicitLittle,
        }
    }

    fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Encoding::ExplicitBig => v.to_be_bytes(),
            _ => v.to_le_bytes(),
        }
    }

    fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Encoding::ExplicitBig => v.to_be_bytes(),
            _ => v.to_le_bytes(),
        }
    }
}

/// VRs that use the reserved bytes plus a 32-bit length in explicit VR.
fn has_long_length(vr: &[u8; 2]) -> bool {
    matches!(
        vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"UC" | b"UN" | b"UR" | b"UT"
    )
}

fn write_element(
    out: &mut Vec<u8>,
    encoding: Encoding,
    group: u16,
    element: u16,
    vr: &[u8; 2],
    value: &[u8],
) {
    out.extend_from_slice(&encoding.u16_bytes(group));
    out.extend_from_slice(&encoding.u16_bytes(element));
    match encoding {
        Encoding::ImplicitLittle => {
            out.extend_from_slice(&encoding.u32_bytes(value.len() as u32));
        }
        _ if has_long_length(vr) => {
            out.extend_from_slice(vr);
            out.extend_from_slice(&[0, 0]);
            out.extend_from_slice(&encoding.u32_bytes(value.len() as u32));
        }
        _ => {
            out.extend_from_slice(vr);
            out.extend_from_slice(&encoding.u16_bytes(value.len() as u16));
        }
    }
    out.extend_from_slice(value);
}

/// Pad a text value to even length.
fn text_value(vr: &[u8; 2], text: &str) -> Vec<u8> {
    let mut value = text.as_bytes().to_vec();
    if value.len() % 2 == 1 {
        value.push(if vr == b"UI" { 0 } else { b' ' });
    }
    value
}

// =============================================================================
// DICOM Builder
// =============================================================================

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Us(u16),
}

/// Builder for synthetic single- or multi-frame grayscale DICOM files.
///
/// Samples are given frame after frame, row-major. Unless overridden the file
/// is Explicit VR Little Endian, 16-bit unsigned MONOCHROME2.
#[derive(Debug, Clone)]
pub struct DicomBuilder {
    transfer_syntax: String,
    rows: u16,
    columns: u16,
    frames: Option<u32>,
    bits_allocated: u16,
    bits_stored: u16,
    signed: bool,
    samples: Option<Vec<i64>>,
    pixel_bytes_override: Option<usize>,
    attributes: Vec<(u16, u16, [u8; 2], Value)>,
}

impl DicomBuilder {
    /// A `columns` x `rows` image whose samples ramp from 0 in steps of 16.
    pub fn new(columns: u16, rows: u16) -> Self {
        let count = rows as i64 * columns as i64;
        Self {
            transfer_syntax: EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
            rows,
            columns,
            frames: None,
            bits_allocated: 16,
            bits_stored: 16,
            signed: false,
            samples: Some((0..count).map(|i| (i * 16) % 4096).collect()),
            pixel_bytes_override: None,
            attributes: vec![
                (0x0008, 0x0060, *b"CS", Value::Text("CT".to_string())),
                (0x0010, 0x0010, *b"PN", Value::Text("Doe^Jane".to_string())),
                (0x0010, 0x0020, *b"LO", Value::Text("PAT-001".to_string())),
                (
                    0x0008,
                    0x0018,
                    *b"UI",
                    Value::Text("1.2.826.0.1.3680043.2.1125.1".to_string()),
                ),
            ],
        }
    }

    pub fn transfer_syntax(mut self, uid: &str) -> Self {
        self.transfer_syntax = uid.to_string();
        self
    }

    /// Replace all samples (every frame, row-major).
    pub fn samples(mut self, samples: Vec<i64>) -> Self {
        self.samples = Some(samples);
        self
    }

    pub fn frames(mut self, frames: u32) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn bits(mut self, allocated: u16, stored: u16) -> Self {
        self.bits_allocated = allocated;
        self.bits_stored = stored;
        self
    }

    pub fn signed(mut self) -> Self {
        self.signed = true;
        self
    }

    pub fn photometric(self, value: &str) -> Self {
        self.text(0x0028, 0x0004, b"CS", value)
    }

    pub fn window(self, center: f64, width: f64) -> Self {
        self.text(0x0028, 0x1050, b"DS", &center.to_string())
            .text(0x0028, 0x1051, b"DS", &width.to_string())
    }

    pub fn rescale(self, slope: f64, intercept: f64) -> Self {
        self.text(0x0028, 0x1052, b"DS", &intercept.to_string())
            .text(0x0028, 0x1053, b"DS", &slope.to_string())
    }

    /// Add or replace a text attribute.
    pub fn text(mut self, group: u16, element: u16, vr: &[u8; 2], value: &str) -> Self {
        self.attributes.retain(|(g, e, _, _)| (*g, *e) != (group, element));
        self.attributes
            .push((group, element, *vr, Value::Text(value.to_string())));
        self
    }

    /// Omit the Pixel Data element entirely.
    pub fn without_pixels(mut self) -> Self {
        self.samples = None;
        self
    }

    /// Keep only the first `len` bytes of Pixel Data.
    pub fn truncate_pixels(mut self, len: usize) -> Self {
        self.pixel_bytes_override = Some(len);
        self
    }

    fn pixel_bytes(&self, encoding: Encoding, samples: &[i64]) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            match self.bits_allocated {
                8 => out.push(s as u8),
                16 => out.extend_from_slice(&encoding.u16_bytes(s as u16)),
                _ => out.extend_from_slice(&encoding.u32_bytes(s as u32)),
            }
        }
        if out.len() % 2 == 1 {
            out.push(0);
        }
        if let Some(len) = self.pixel_bytes_override {
            out.truncate(len);
        }
        out
    }

    /// Serialize to a complete Part 10 byte stream.
    pub fn build(&self) -> Vec<u8> {
        let encoding = Encoding::for_uid(&self.transfer_syntax);

        let mut out = vec![0u8; 128];
        out.extend_from_slice(b"DICM");
        write_element(
            &mut out,
            Encoding::ExplicitLittle,
            0x0002,
            0x0010,
            b"UI",
            &text_value(b"UI", &self.transfer_syntax),
        );

        let mut elements: Vec<(u16, u16, [u8; 2], Value)> = self.attributes.clone();
        elements.push((0x0028, 0x0002, *b"US", Value::Us(1)));
        elements.push((0x0028, 0x0010, *b"US", Value::Us(self.rows)));
        elements.push((0x0028, 0x0011, *b"US", Value::Us(self.columns)));
        elements.push((0x0028, 0x0100, *b"US", Value::Us(self.bits_allocated)));
        elements.push((0x0028, 0x0101, *b"US", Value::Us(self.bits_stored)));
        elements.push((0x0028, 0x0102, *b"US", Value::Us(self.bits_stored - 1)));
        elements.push((0x0028, 0x0103, *b"US", Value::Us(self.signed as u16)));
        if let Some(frames) = self.frames {
            elements.push((0x0028, 0x0008, *b"IS", Value::Text(frames.to_string())));
        }
        if !self.attributes.iter().any(|(g, e, _, _)| (*g, *e) == (0x0028, 0x0004)) {
            elements.push((0x0028, 0x0004, *b"CS", Value::Text("MONOCHROME2".to_string())));
        }
        elements.sort_by_key(|(g, e, _, _)| (*g, *e));

        for (group, element, vr, value) in &elements {
            let bytes = match value {
                Value::Text(text) => text_value(vr, text),
                Value::Us(v) => encoding.u16_bytes(*v).to_vec(),
            };
            write_element(&mut out, encoding, *group, *element, vr, &bytes);
        }

        if let Some(samples) = &self.samples {
            let vr = if self.bits_allocated == 8 { b"OB" } else { b"OW" };
            let bytes = self.pixel_bytes(encoding, samples);
            write_element(&mut out, encoding, 0x7FE0, 0x0010, vr, &bytes);
        }

        out
    }

    /// Write the file into `dir` and return its path.
    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, self.build()).unwrap();
        path
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Decode an encoded raster back to 8-bit gray.
pub fn decode_gray(bytes: &[u8]) -> GrayImage {
    image::load_from_memory(bytes).unwrap().to_luma8()
}

pub fn gray_values(img: &GrayImage) -> Vec<u8> {
    img.pixels().map(|p| p.0[0]).collect()
}

/// Returns true if data starts with the JPEG SOI marker.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.starts_with(b"\x89PNG\r\n\x1a\n")
}
