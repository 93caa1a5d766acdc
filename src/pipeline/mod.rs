//! DICOM image pipeline.
//!
//! ```text
//! Load ─► ExtractPixels ─► SelectFrame ─► Normalize ─► Enhance? ─► Filter?
//!                                                                    │
//!                       Return ◄─ (cache store) ◄─ Encode ◄─ Resize? ◄┘
//! ```
//!
//! # Components
//!
//! - [`ImagePipeline`]: orchestrates the stages and the cache round trip
//! - [`select_frame`], [`normalize`], [`enhance`], [`apply_filter`], [`resize`],
//!   [`encode`], [`make_thumbnail`]: the individual stages, usable on their own
//! - [`ProcessingRequest`] / [`ProcessingResult`]: the `process` contract

mod encoder;
mod enhance;
mod filter;
mod grid;
mod metadata;
mod normalize;
mod resize;
mod service;

pub use encoder::{
    clamp_quality, encode, is_valid_quality, make_thumbnail, OutputFormat, DEFAULT_JPEG_QUALITY,
    DEFAULT_THUMBNAIL_QUALITY, DEFAULT_THUMBNAIL_SIZE, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use enhance::{enhance, enhance_by_name, resolve_enhancement, Enhancement};
pub use filter::{apply_filter, apply_filter_by_name, resolve_filter, FilterType};
pub use grid::{select_frame, Frame, FrameSelection, PixelGrid};
pub use metadata::ImageMetadata;
pub use normalize::{normalize, Window};
pub use resize::{resize, TargetSize};
pub use service::{
    DecodedImage, ImagePipeline, OutputInfo, PipelineConfig, PipelineStats, ProcessingMetadata,
    ProcessingRequest, ProcessingResult, Rescale, METADATA_OPERATION,
};
