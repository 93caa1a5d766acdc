//! # DICOM Pipeline
//!
//! Decode DICOM Part 10 files, normalize and enhance their pixel data, encode
//! the result to a common raster format, and memoize every derived artifact in
//! a two-tier (memory + disk) content cache.
//!
//! ## Features
//!
//! - **Native DICOM reader**: implicit/explicit VR, little/big endian, multi-frame,
//!   8/16/32-bit signed or unsigned samples
//! - **Windowing and normalization**: file or explicit window, MONOCHROME1 inversion
//! - **Enhancement and filters**: CLAHE, histogram equalization, gamma, unsharp mask,
//!   Gaussian, median, bilateral and edge-enhance filters
//! - **Content cache**: keyed by file identity (path, mtime, size) and operation,
//!   LRU in memory, size-bounded LRU on disk with an atomically replaced index
//!
//! ## Architecture
//!
//! - [`io`] - endian helpers and atomic file replacement
//! - [`mod@format`] - DICOM container parser and pixel decoding
//! - [`pipeline`] - processing stages and the [`ImagePipeline`] orchestrator
//! - [`cache`] - the [`ContentCache`] and its tiers
//! - [`config`] - CLI types for the `dicom-pipeline` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dicom_pipeline::{
//!     CacheConfig, ContentCache, FilterType, ImagePipeline, OutputFormat, PipelineConfig,
//!     ProcessingRequest,
//! };
//!
//! let cache = Arc::new(ContentCache::new(CacheConfig::new("/var/cache/dicom")));
//! let pipeline = ImagePipeline::new(PipelineConfig::default(), Some(cache));
//!
//! let request = ProcessingRequest::new("ct_slice.dcm")
//!     .with_filter(FilterType::Median)
//!     .with_format(OutputFormat::Png);
//!
//! let result = pipeline.process(&request);
//! if let Some(png) = result.encoded_image {
//!     std::fs::write("ct_slice.png", png).unwrap();
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod io;
pub mod pipeline;

// Re-export commonly used types
pub use cache::{cache_key, CacheConfig, CachePayload, CacheStats, ContentCache};
pub use config::{CacheCommand, Cli, Command};
pub use error::{CacheError, DicomError, PipelineError};
pub use format::dicom::{DataSet, DicomFile, ParseOptions, Photometric, PixelLayout, Tag, TransferSyntax};
pub use pipeline::{
    apply_filter, encode, enhance, make_thumbnail, normalize, resize, select_frame,
    DecodedImage, Enhancement, FilterType, Frame, FrameSelection, ImageMetadata, ImagePipeline,
    OutputFormat, PipelineConfig, PipelineStats, PixelGrid, ProcessingMetadata,
    ProcessingRequest, ProcessingResult, TargetSize, Window,
};
