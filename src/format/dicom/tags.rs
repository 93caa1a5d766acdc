//! DICOM tag, VR and transfer syntax definitions.
//!
//! Only the attributes the pipeline reads are named here. Every other element
//! is still parsed (so offsets stay correct) and kept by tag.

use std::fmt;

use crate::error::DicomError;

// =============================================================================
// Tags
// =============================================================================

/// A DICOM attribute tag: (group, element).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    // -------------------------------------------------------------------------
    // File Meta Information
    // -------------------------------------------------------------------------
    pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);

    // -------------------------------------------------------------------------
    // Identification
    // -------------------------------------------------------------------------
    pub const SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x0018);
    pub const STUDY_DATE: Tag = Tag::new(0x0008, 0x0020);
    pub const ACQUISITION_DATE: Tag = Tag::new(0x0008, 0x0022);
    pub const STUDY_TIME: Tag = Tag::new(0x0008, 0x0030);
    pub const ACQUISITION_TIME: Tag = Tag::new(0x0008, 0x0032);
    pub const MODALITY: Tag = Tag::new(0x0008, 0x0060);
    pub const MANUFACTURER: Tag = Tag::new(0x0008, 0x0070);
    pub const INSTITUTION_NAME: Tag = Tag::new(0x0008, 0x0080);
    pub const STUDY_DESCRIPTION: Tag = Tag::new(0x0008, 0x1030);
    pub const SERIES_DESCRIPTION: Tag = Tag::new(0x0008, 0x103E);

    // -------------------------------------------------------------------------
    // Patient
    // -------------------------------------------------------------------------
    pub const PATIENT_NAME: Tag = Tag::new(0x0010, 0x0010);
    pub const PATIENT_ID: Tag = Tag::new(0x0010, 0x0020);
    pub const PATIENT_BIRTH_DATE: Tag = Tag::new(0x0010, 0x0030);
    pub const PATIENT_SEX: Tag = Tag::new(0x0010, 0x0040);

    // -------------------------------------------------------------------------
    // Acquisition / relationship
    // -------------------------------------------------------------------------
    pub const BODY_PART_EXAMINED: Tag = Tag::new(0x0018, 0x0015);
    pub const SLICE_THICKNESS: Tag = Tag::new(0x0018, 0x0050);
    pub const STUDY_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000D);
    pub const SERIES_INSTANCE_UID: Tag = Tag::new(0x0020, 0x000E);
    pub const SERIES_NUMBER: Tag = Tag::new(0x0020, 0x0011);
    pub const INSTANCE_NUMBER: Tag = Tag::new(0x0020, 0x0013);

    // -------------------------------------------------------------------------
    // Image Pixel module
    // -------------------------------------------------------------------------
    pub const SAMPLES_PER_PIXEL: Tag = Tag::new(0x0028, 0x0002);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag::new(0x0028, 0x0004);
    pub const PLANAR_CONFIGURATION: Tag = Tag::new(0x0028, 0x0006);
    pub const NUMBER_OF_FRAMES: Tag = Tag::new(0x0028, 0x0008);
    pub const ROWS: Tag = Tag::new(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag::new(0x0028, 0x0011);
    pub const PIXEL_SPACING: Tag = Tag::new(0x0028, 0x0030);
    pub const BITS_ALLOCATED: Tag = Tag::new(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag::new(0x0028, 0x0101);
    pub const PIXEL_REPRESENTATION: Tag = Tag::new(0x0028, 0x0103);
    pub const WINDOW_CENTER: Tag = Tag::new(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag::new(0x0028, 0x1051);
    pub const RESCALE_INTERCEPT: Tag = Tag::new(0x0028, 0x1052);
    pub const RESCALE_SLOPE: Tag = Tag::new(0x0028, 0x1053);
    pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

    // -------------------------------------------------------------------------
    // Item delimiters (group FFFE never carries a VR)
    // -------------------------------------------------------------------------
    pub const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE0DD);

    /// Whether this tag is one of the item/sequence delimiters.
    #[inline]
    pub const fn is_delimiter(&self) -> bool {
        self.group == 0xFFFE
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

// =============================================================================
// Value Representation
// =============================================================================

/// Two-letter value representation code of an explicit VR element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vr([u8; 2]);

impl Vr {
    pub const SQ: Vr = Vr(*b"SQ");
    pub const UN: Vr = Vr(*b"UN");

    /// Parse the two VR bytes of an explicit VR element header.
    pub fn from_bytes(bytes: [u8; 2]) -> Result<Self, DicomError> {
        if bytes.iter().all(|b| b.is_ascii_uppercase()) {
            Ok(Vr(bytes))
        } else {
            Err(DicomError::InvalidVr(u16::from_be_bytes(bytes)))
        }
    }

    /// VRs encoded with two reserved bytes and a 32-bit length.
    pub fn has_long_length(&self) -> bool {
        matches!(
            &self.0,
            b"OB" | b"OD" | b"OF" | b"OL" | b"OV" | b"OW" | b"SQ" | b"SV" | b"UC" | b"UN" | b"UR"
                | b"UT" | b"UV"
        )
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("??")
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transfer Syntax
// =============================================================================

/// Transfer syntaxes whose pixel data is stored natively (uncompressed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSyntax {
    /// 1.2.840.10008.1.2 (the DICOM default)
    ImplicitVrLittleEndian,

    /// 1.2.840.10008.1.2.1
    ExplicitVrLittleEndian,

    /// 1.2.840.10008.1.2.2 (retired, still found in archives)
    ExplicitVrBigEndian,
}

impl TransferSyntax {
    /// Resolve a transfer syntax UID.
    ///
    /// Encapsulated (JPEG, JPEG 2000, RLE) and deflated syntaxes are rejected.
    pub fn from_uid(uid: &str) -> Result<Self, DicomError> {
        match uid.trim_end_matches(|c: char| c == '\0' || c == ' ') {
            "1.2.840.10008.1.2" => Ok(TransferSyntax::ImplicitVrLittleEndian),
            "1.2.840.10008.1.2.1" => Ok(TransferSyntax::ExplicitVrLittleEndian),
            "1.2.840.10008.1.2.2" => Ok(TransferSyntax::ExplicitVrBigEndian),
            other => Err(DicomError::UnsupportedTransferSyntax(other.to_string())),
        }
    }

    pub const fn uid(&self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => "1.2.840.10008.1.2",
            TransferSyntax::ExplicitVrLittleEndian => "1.2.840.10008.1.2.1",
            TransferSyntax::ExplicitVrBigEndian => "1.2.840.10008.1.2.2",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => "Implicit VR Little Endian",
            TransferSyntax::ExplicitVrLittleEndian => "Explicit VR Little Endian",
            TransferSyntax::ExplicitVrBigEndian => "Explicit VR Big Endian",
        }
    }

    #[inline]
    pub const fn is_explicit_vr(&self) -> bool {
        !matches!(self, TransferSyntax::ImplicitVrLittleEndian)
    }

    #[inline]
    pub const fn is_big_endian(&self) -> bool {
        matches!(self, TransferSyntax::ExplicitVrBigEndian)
    }
}

// =============================================================================
// Tests
// =============================================================================
