//! DICOM Part 10 container parsing.
//!
//! # File Structure
//!
//! ```text
//! Bytes 0-127:   Preamble (ignored)
//! Bytes 128-131: "DICM"
//! Group 0002:    File Meta Information, always Explicit VR Little Endian
//! Remainder:     Data set, encoded in the declared transfer syntax
//! ```
//!
//! # Element Header
//!
//! ```text
//! Explicit VR, short form: tag(4) VR(2) length(2)
//! Explicit VR, long form:  tag(4) VR(2) reserved(2) length(4)   (OB, OW, SQ, UN, UT, ...)
//! Implicit VR:             tag(4) length(4)
//! Delimiters (FFFE,xxxx):  tag(4) length(4)                     (in every syntax)
//! ```
//!
//! Sequences are walked structurally so that undefined-length items do not
//! derail the parser, but their contents are not retained. Only top-level
//! elements end up in the [`DataSet`].

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::trace;

use crate::error::DicomError;
use crate::io::ByteOrder;

use super::tags::{Tag, TransferSyntax, Vr};

// =============================================================================
// Constants
// =============================================================================

/// Length of the ignored preamble
const PREAMBLE_LEN: usize = 128;

/// Magic prefix following the preamble
const DICM_PREFIX: &[u8; 4] = b"DICM";

/// Offset of the first File Meta element
pub const DATASET_START: usize = PREAMBLE_LEN + DICM_PREFIX.len();

/// Length value marking an undefined-length sequence or item
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

/// File Meta Information group number
const META_GROUP: u16 = 0x0002;

/// Guard against pathological nesting in hostile files
const MAX_SEQUENCE_DEPTH: usize = 32;

// =============================================================================
// Element
// =============================================================================

/// A top-level data element.
///
/// The value is a zero-copy slice of the file buffer.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: Tag,

    /// VR as written in the file (`None` in Implicit VR data sets)
    pub vr: Option<Vr>,

    pub value: Bytes,

    byte_order: ByteOrder,
}

impl Element {
    /// Byte order the value was encoded with.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// All backslash-separated text values, trimmed of padding.
    pub fn strings(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.value)
            .split('\\')
            .map(|v| v.trim_matches(|c: char| c == '\0' || c == ' ').to_string())
            .collect()
    }

    /// First text value, or `None` if empty.
    pub fn first_string(&self) -> Option<String> {
        self.strings().into_iter().next().filter(|s| !s.is_empty())
    }

    /// Value as an unsigned short (US).
    pub fn as_u16(&self) -> Option<u16> {
        (self.value.len() >= 2).then(|| self.byte_order.read_u16(&self.value))
    }

    /// All values of a decimal string (DS) or integer string (IS).
    pub fn numbers(&self) -> Vec<f64> {
        self.strings()
            .iter()
            .filter_map(|s| s.parse::<f64>().ok())
            .collect()
    }

    /// First numeric value of a DS or IS element.
    pub fn first_number(&self) -> Option<f64> {
        self.first_string().and_then(|s| s.parse::<f64>().ok())
    }
}

// =============================================================================
// DataSet
// =============================================================================

/// Top-level elements of a DICOM data set, keyed by tag.
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    elements: BTreeMap<Tag, Element>,
}

impl DataSet {
    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }

    /// First text value of `tag`.
    pub fn string(&self, tag: Tag) -> Option<String> {
        self.get(tag).and_then(Element::first_string)
    }

    /// Unsigned short value of `tag`.
    pub fn u16(&self, tag: Tag) -> Option<u16> {
        self.get(tag).and_then(Element::as_u16)
    }

    /// First numeric value of a DS/IS `tag`.
    pub fn number(&self, tag: Tag) -> Option<f64> {
        self.get(tag).and_then(Element::first_number)
    }

    /// All numeric values of a DS/IS `tag`.
    pub fn numbers(&self, tag: Tag) -> Vec<f64> {
        self.get(tag).map(Element::numbers).unwrap_or_default()
    }

    fn insert(&mut self, element: Element) {
        self.elements.insert(element.tag, element);
    }
}

// =============================================================================
// DicomFile
// =============================================================================

/// Options controlling how much of the file is parsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    /// Stop at the Pixel Data element (header-only read)
    pub stop_before_pixels: bool,
}

/// A parsed DICOM Part 10 file.
#[derive(Debug, Clone)]
pub struct DicomFile {
    /// File Meta Information (group 0002)
    pub meta: DataSet,

    pub transfer_syntax: TransferSyntax,

    /// Main data set
    pub dataset: DataSet,
}

impl DicomFile {
    /// Parse a complete file buffer.
    ///
    /// # Errors
    /// - `FileTooSmall` / `MissingPrefix` if this is not a Part 10 file
    /// - `MissingElement` if the meta group has no Transfer Syntax UID
    /// - `UnsupportedTransferSyntax` for encapsulated or deflated syntaxes
    /// - `Truncated` / `InvalidVr` / `MalformedSequence` for corrupt data
    pub fn parse(data: Bytes, options: ParseOptions) -> Result<Self, DicomError> {
        if data.len() < DATASET_START {
            return Err(DicomError::FileTooSmall {
                required: DATASET_START as u64,
                actual: data.len() as u64,
            });
        }
        if !is_dicom_header(&data) {
            return Err(DicomError::MissingPrefix);
        }

        let mut meta_reader = ElementReader {
            data: &data,
            pos: DATASET_START,
            byte_order: ByteOrder::LittleEndian,
            explicit_vr: true,
        };
        let meta = meta_reader.read_dataset(ParseOptions::default(), Some(META_GROUP))?;

        let uid = meta
            .string(Tag::TRANSFER_SYNTAX_UID)
            .ok_or(DicomError::MissingElement("TransferSyntaxUID"))?;
        let transfer_syntax = TransferSyntax::from_uid(&uid)?;
        trace!(
            transfer_syntax = transfer_syntax.name(),
            meta_elements = meta.len(),
            "parsed file meta information"
        );

        let mut reader = ElementReader {
            data: &data,
            pos: meta_reader.pos,
            byte_order: if transfer_syntax.is_big_endian() {
                ByteOrder::BigEndian
            } else {
                ByteOrder::LittleEndian
            },
            explicit_vr: transfer_syntax.is_explicit_vr(),
        };
        let dataset = reader.read_dataset(options, None)?;

        Ok(DicomFile {
            meta,
            transfer_syntax,
            dataset,
        })
    }

    /// The native Pixel Data element, if present.
    pub fn pixel_data(&self) -> Option<&Element> {
        self.dataset.get(Tag::PIXEL_DATA)
    }
}

/// Check whether bytes start with a Part 10 preamble and `DICM` prefix.
pub fn is_dicom_header(bytes: &[u8]) -> bool {
    bytes.len() >= DATASET_START && &bytes[PREAMBLE_LEN..DATASET_START] == DICM_PREFIX
}

// =============================================================================
// Element Reader
// =============================================================================

struct ElementHeader {
    tag: Tag,
    vr: Option<Vr>,
    length: u32,
    offset: usize,
}

struct ElementReader<'a> {
    data: &'a Bytes,
    pos: usize,
    byte_order: ByteOrder,
    explicit_vr: bool,
}

impl<'a> ElementReader<'a> {
    #[inline]
    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn peek_group(&self) -> Option<u16> {
        (self.remaining() >= 2).then(|| self.byte_order.read_u16(&self.data[self.pos..]))
    }

    /// Trailing bytes too short for a header and all zero are file padding.
    fn only_padding_left(&self) -> bool {
        self.remaining() < 8 && self.data[self.pos..].iter().all(|b| *b == 0)
    }

    fn raw(&mut self, tag: Option<Tag>, len: usize) -> Result<&'a [u8], DicomError> {
        let data: &'a Bytes = self.data;
        if self.remaining() < len {
            return Err(DicomError::Truncated {
                tag: tag.map_or_else(|| "header".to_string(), |t| t.to_string()),
                offset: self.pos as u64,
                needed: len as u64,
                available: self.remaining() as u64,
            });
        }
        let slice = &data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn value(&mut self, tag: Tag, len: usize) -> Result<Bytes, DicomError> {
        let start = self.pos;
        self.raw(Some(tag), len)?;
        Ok(self.data.slice(start..start + len))
    }

    fn read_header(&mut self) -> Result<ElementHeader, DicomError> {
        let offset = self.pos;
        let order = self.byte_order;

        let tag_bytes = self.raw(None, 4)?;
        let tag = Tag::new(order.read_u16(&tag_bytes[0..2]), order.read_u16(&tag_bytes[2..4]));

        if tag.is_delimiter() || !self.explicit_vr {
            let length = order.read_u32(self.raw(Some(tag), 4)?);
            return Ok(ElementHeader {
                tag,
                vr: None,
                length,
                offset,
            });
        }

        let vr_bytes = self.raw(Some(tag), 2)?;
        let vr = Vr::from_bytes([vr_bytes[0], vr_bytes[1]])?;
        let length = if vr.has_long_length() {
            self.raw(Some(tag), 2)?;
            order.read_u32(self.raw(Some(tag), 4)?)
        } else {
            order.read_u16(self.raw(Some(tag), 2)?) as u32
        };

        Ok(ElementHeader {
            tag,
            vr: Some(vr),
            length,
            offset,
        })
    }

    /// Read elements until the end of the buffer, or until the group changes
    /// when `only_group` is set.
    fn read_dataset(
        &mut self,
        options: ParseOptions,
        only_group: Option<u16>,
    ) -> Result<DataSet, DicomError> {
        let mut dataset = DataSet::default();

        while self.remaining() > 0 {
            if let Some(group) = only_group {
                if self.peek_group() != Some(group) {
                    break;
                }
            }
            if self.only_padding_left() {
                break;
            }

            let start = self.pos;
            let header = self.read_header()?;

            if options.stop_before_pixels && header.tag == Tag::PIXEL_DATA {
                self.pos = start;
                break;
            }

            if header.tag.is_delimiter() {
                return Err(DicomError::MalformedSequence {
                    offset: header.offset as u64,
                    message: format!("unexpected delimiter {} outside a sequence", header.tag),
                });
            }

            if header.length == UNDEFINED_LENGTH {
                if header.tag == Tag::PIXEL_DATA {
                    return Err(DicomError::UnsupportedPixelLayout(
                        "encapsulated pixel data in a native transfer syntax".to_string(),
                    ));
                }
                self.skip_undefined_sequence(0)?;
                continue;
            }

            let value = self.value(header.tag, header.length as usize)?;
            if header.vr == Some(Vr::SQ) {
                continue;
            }

            dataset.insert(Element {
                tag: header.tag,
                vr: header.vr,
                value,
                byte_order: self.byte_order,
            });
        }

        Ok(dataset)
    }

    fn skip_undefined_sequence(&mut self, depth: usize) -> Result<(), DicomError> {
        if depth > MAX_SEQUENCE_DEPTH {
            return Err(DicomError::MalformedSequence {
                offset: self.pos as u64,
                message: "sequence nesting too deep".to_string(),
            });
        }

        loop {
            let header = self.read_header()?;
            match header.tag {
                Tag::ITEM if header.length == UNDEFINED_LENGTH => {
                    self.skip_undefined_item(depth + 1)?;
                }
                Tag::ITEM => {
                    self.raw(Some(header.tag), header.length as usize)?;
                }
                Tag::SEQUENCE_DELIMITATION => return Ok(()),
                other => {
                    return Err(DicomError::MalformedSequence {
                        offset: header.offset as u64,
                        message: format!("expected item, found {}", other),
                    })
                }
            }
        }
    }

    fn skip_undefined_item(&mut self, depth: usize) -> Result<(), DicomError> {
        loop {
            let header = self.read_header()?;
            if header.tag == Tag::ITEM_DELIMITATION {
                return Ok(());
            }
            if header.length == UNDEFINED_LENGTH {
                self.skip_undefined_sequence(depth + 1)?;
            } else {
                self.raw(Some(header.tag), header.length as usize)?;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
