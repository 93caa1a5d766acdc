//! DICOM Part 10 reader.
//!
//! # Key Concepts
//!
//! - **Transfer syntax**: declared in the file meta group; fixes byte order,
//!   whether VRs are written explicitly, and whether Pixel Data is compressed.
//!   Only the three native (uncompressed) syntaxes are decoded.
//!
//! - **Top-level elements only**: sequences are walked so their lengths can be
//!   skipped, but nested items are not retained.
//!
//! - **Stored values**: [`decode_samples`] yields raw stored values. Rescale and
//!   photometric inversion belong to the image pipeline.

mod parser;
mod pixels;
mod tags;

pub use parser::{is_dicom_header, DataSet, DicomFile, Element, ParseOptions, DATASET_START};
pub use pixels::{decode_samples, Photometric, PixelLayout};
pub use tags::{Tag, TransferSyntax, Vr};
