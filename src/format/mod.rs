//! Container format readers.
//!
//! Currently only DICOM Part 10 with native pixel data is supported. Use
//! [`dicom::is_dicom_header`] to sniff a buffer before a full parse.

pub mod dicom;

pub use dicom::{is_dicom_header, DicomFile, ParseOptions};
