use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when parsing a DICOM container
#[derive(Debug, Clone, Error)]
pub enum DicomError {
    /// File is too small to contain the preamble and `DICM` prefix
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// The `DICM` prefix is missing after the 128-byte preamble
    #[error("Missing DICM prefix at offset 128")]
    MissingPrefix,

    /// An element header or value runs past the end of the buffer
    #[error("Truncated element {tag} at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        tag: String,
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// The file meta group does not declare a transfer syntax
    #[error("Missing required element: {0}")]
    MissingElement(&'static str),

    /// Transfer syntax is encapsulated, deflated or unknown
    #[error("Unsupported transfer syntax: {0}")]
    UnsupportedTransferSyntax(String),

    /// VR bytes are not two uppercase ASCII letters
    #[error("Invalid VR 0x{0:04X} in explicit VR data set")]
    InvalidVr(u16),

    /// Nested sequence or item structure is malformed
    #[error("Malformed sequence at offset {offset}: {message}")]
    MalformedSequence { offset: u64, message: String },

    /// Pixel module attributes are inconsistent or unsupported
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedPixelLayout(String),

    /// Pixel Data holds fewer bytes than rows x columns x frames require
    #[error("Pixel data truncated: expected {expected} bytes, got {actual}")]
    PixelDataTruncated { expected: u64, actual: u64 },
}

/// Errors surfaced by the image pipeline.
///
/// Every variant is fatal for a single `process()` call and is reported to the
/// caller as a failed `ProcessingResult`, never as a panic.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The source file could not be read
    #[error("Cannot read {path}: {message}")]
    FileRead { path: PathBuf, message: String },

    /// The file is not a parseable DICOM container, or is truncated/corrupt
    #[error("Decode error: {0}")]
    Decode(#[from] DicomError),

    /// The container parsed but carries no Pixel Data element
    #[error("No pixel data in {path}")]
    NoPixelData { path: PathBuf },

    /// Explicit frame index outside `[0, frame_count)`
    #[error("Frame index {requested} out of range (frame count {frame_count})")]
    FrameIndex { requested: usize, frame_count: usize },

    /// Requested output encoding is not PNG, JPEG, TIFF or BMP
    #[error("Unsupported output format: {format} (expected PNG, JPEG, TIFF or BMP)")]
    UnsupportedFormat { format: String },

    /// Request parameters failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The raster encoder rejected the image
    #[error("Failed to encode image: {message}")]
    Encode { message: String },
}

/// Errors raised inside the content cache.
///
/// These never leave the cache's public API; they are logged and turned into
/// misses or a degraded memory-only session.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The source file used for key derivation is missing or unreadable
    #[error("Source file unavailable for key derivation {path}: {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A blob file failed to decode
    #[error("Corrupted cache entry {key}: {reason}")]
    Corruption { key: String, reason: String },

    /// The metadata index could not be read or written
    #[error("Cache index I/O error at {path}: {message}")]
    IndexIo { path: PathBuf, message: String },

    /// Blob file I/O error
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}
