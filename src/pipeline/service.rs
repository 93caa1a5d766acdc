//! Image pipeline orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          ImagePipeline                            │
//! │  process(request)                                                 │
//! │    1. Derive operation name     5. Enhance? / Filter? / Resize?  │
//! │    2. Check ContentCache        6. Encode + thumbnail             │
//! │    3. Load + extract pixels     7. Store in ContentCache          │
//! │    4. Select frame, normalize                                     │
//! └──────────────────────────────────────────────────────────────────┘
//!          │                     │                       │
//!          ▼                     ▼                       ▼
//!   ┌──────────────┐   ┌──────────────────┐   ┌────────────────────┐
//!   │ ContentCache │   │ format::dicom    │   │ stage functions    │
//!   └──────────────┘   └──────────────────┘   └────────────────────┘
//! ```
//!
//! Every stage failure short-circuits to a failed [`ProcessingResult`]; no
//! partial output is ever returned or cached.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::cache::{CachePayload, ContentCache};
use crate::error::PipelineError;
use crate::format::dicom::{decode_samples, DicomFile, ParseOptions, Photometric, PixelLayout, Tag};

use super::encoder::{
    encode, is_valid_quality, make_thumbnail, OutputFormat, DEFAULT_JPEG_QUALITY,
    DEFAULT_THUMBNAIL_QUALITY, DEFAULT_THUMBNAIL_SIZE,
};
use super::enhance::{enhance, resolve_enhancement, Enhancement};
use super::filter::{apply_filter, resolve_filter, FilterType};
use super::grid::{select_frame, FrameSelection, PixelGrid};
use super::metadata::ImageMetadata;
use super::normalize::{normalize, Window};
use super::resize::{resize, TargetSize};

/// Operation name for cached header metadata
pub const METADATA_OPERATION: &str = "metadata";

/// Bumped whenever the meaning of a cached `process` result changes
const PROCESS_SCHEMA: &str = "v1";

const IMAGE_BLOB: &str = "image";
const THUMBNAIL_BLOB: &str = "thumbnail";
const METADATA_FIELD: &str = "metadata";

// =============================================================================
// Configuration
// =============================================================================

/// Pipeline-wide encoding settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// JPEG quality for full-size output (1-100)
    pub jpeg_quality: u8,

    pub thumbnail_size: TargetSize,

    /// JPEG quality for thumbnails (1-100)
    pub thumbnail_quality: u8,

    /// Fit-and-pad instead of stretching when a target size is given
    pub maintain_aspect: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            thumbnail_size: TargetSize {
                width: DEFAULT_THUMBNAIL_SIZE,
                height: DEFAULT_THUMBNAIL_SIZE,
            },
            thumbnail_quality: DEFAULT_THUMBNAIL_QUALITY,
            maintain_aspect: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }
        if !is_valid_quality(self.thumbnail_quality) {
            return Err("thumbnail_quality must be between 1 and 100".to_string());
        }
        if self.thumbnail_size.width == 0 || self.thumbnail_size.height == 0 {
            return Err("thumbnail_size must be non-zero".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Processing Request
// =============================================================================

/// Parameters for one `process` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingRequest {
    pub file_path: PathBuf,
    pub enhancement: Option<Enhancement>,
    pub filter_type: Option<FilterType>,
    pub output_format: OutputFormat,
    pub target_size: Option<TargetSize>,

    /// Frame of a multi-frame file; `None` selects frame 0
    pub frame_index: Option<usize>,

    pub use_cache: bool,

    /// Explicit window overriding the file's own hints
    pub window: Option<Window>,

    /// Use the file's window hints when no explicit window is given
    pub apply_windowing: bool,
}

impl ProcessingRequest {
    /// PNG output, no enhancement or filter, native size, cached.
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            enhancement: None,
            filter_type: None,
            output_format: OutputFormat::Png,
            target_size: None,
            frame_index: None,
            use_cache: true,
            window: None,
            apply_windowing: true,
        }
    }

    pub fn with_enhancement(mut self, enhancement: Enhancement) -> Self {
        self.enhancement = Some(enhancement);
        self
    }

    /// Set the enhancement by name; unknown names are logged and ignored.
    pub fn with_enhancement_name(mut self, name: &str) -> Self {
        self.enhancement = resolve_enhancement(name);
        self
    }

    pub fn with_filter(mut self, filter: FilterType) -> Self {
        self.filter_type = Some(filter);
        self
    }

    /// Set the filter by name; unknown names are logged and ignored.
    pub fn with_filter_name(mut self, name: &str) -> Self {
        self.filter_type = resolve_filter(name);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_target_size(mut self, size: TargetSize) -> Self {
        self.target_size = Some(size);
        self
    }

    pub fn with_frame(mut self, index: usize) -> Self {
        self.frame_index = Some(index);
        self
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = Some(window);
        self
    }

    pub fn without_windowing(mut self) -> Self {
        self.apply_windowing = false;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if let Some(size) = self.target_size {
            TargetSize::new(size.width, size.height)?;
        }
        if let Some(window) = self.window {
            if window.bounds().is_none() {
                return Err(PipelineError::InvalidRequest(format!(
                    "window width must be positive, got {}",
                    window.width
                )));
            }
        }
        Ok(())
    }

    fn window_mode(&self) -> String {
        match (self.window, self.apply_windowing) {
            (Some(w), _) => format!("{},{}", w.center, w.width),
            (None, true) => "auto".to_string(),
            (None, false) => "none".to_string(),
        }
    }
}

// =============================================================================
// Processing Result
// =============================================================================

/// Description of the encoded output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub format: Option<OutputFormat>,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub enhancement: Option<Enhancement>,
    pub filter_type: Option<FilterType>,

    /// Window actually applied, if any
    pub window: Option<Window>,
}

/// Structured metadata attached to every result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub image: Option<ImageMetadata>,
    pub frame: FrameSelection,
    pub output: OutputInfo,
    pub operation: String,
    pub from_cache: bool,
}

/// Outcome of [`ImagePipeline::process`].
///
/// `encoded_image` is present iff `success`; `error` iff not.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingResult {
    pub success: bool,
    pub metadata: ProcessingMetadata,
    pub encoded_image: Option<Bytes>,
    pub thumbnail: Option<Bytes>,
    pub error: Option<String>,
}

impl ProcessingResult {
    fn failure(operation: String, err: &PipelineError) -> Self {
        Self {
            success: false,
            metadata: ProcessingMetadata {
                operation,
                ..Default::default()
            },
            encoded_image: None,
            thumbnail: None,
            error: Some(err.to_string()),
        }
    }

    fn to_payload(&self) -> Option<CachePayload> {
        let metadata = serde_json::to_value(&self.metadata).ok()?;
        let mut payload = CachePayload::new()
            .with_field(METADATA_FIELD, metadata)
            .with_blob(IMAGE_BLOB, self.encoded_image.clone()?);
        if let Some(thumbnail) = &self.thumbnail {
            payload = payload.with_blob(THUMBNAIL_BLOB, thumbnail.clone());
        }
        Some(payload)
    }

    fn from_payload(payload: &CachePayload) -> Option<Self> {
        let mut metadata: ProcessingMetadata =
            serde_json::from_value(payload.field(METADATA_FIELD)?.clone()).ok()?;
        metadata.from_cache = true;

        Some(Self {
            success: true,
            metadata,
            encoded_image: Some(payload.blob(IMAGE_BLOB)?.clone()),
            thumbnail: payload.blob(THUMBNAIL_BLOB).cloned(),
            error: None,
        })
    }
}

// =============================================================================
// Decoded Image
// =============================================================================

/// Modality LUT parameters: `value = stored * slope + intercept`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    pub slope: f64,
    pub intercept: f64,
}

impl Default for Rescale {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

/// A loaded file: stored pixel values plus everything needed to interpret them.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub path: PathBuf,

    /// Stored sample values; `None` when the file has no Pixel Data
    pub pixels: Option<PixelGrid>,

    pub frame_count: usize,
    pub photometric: Photometric,
    pub window: Option<Window>,
    pub rescale: Rescale,
    pub metadata: ImageMetadata,
}

// =============================================================================
// Stats
// =============================================================================

/// Pipeline counters, mainly for observing memoization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Files fully decoded (pixel data included)
    pub decodes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    decodes: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    failures: AtomicU64,
}

// =============================================================================
// Image Pipeline
// =============================================================================

/// Decode, transform and encode DICOM images, memoized through a
/// [`ContentCache`].
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use dicom_pipeline::{CacheConfig, ContentCache, ImagePipeline, PipelineConfig};
/// use dicom_pipeline::{Enhancement, OutputFormat, ProcessingRequest};
///
/// let cache = Arc::new(ContentCache::new(CacheConfig::new("/tmp/dicom_cache")));
/// let pipeline = ImagePipeline::new(PipelineConfig::default(), Some(cache));
///
/// let request = ProcessingRequest::new("scan.dcm")
///     .with_enhancement(Enhancement::Clahe)
///     .with_format(OutputFormat::Jpeg);
/// let result = pipeline.process(&request);
/// assert!(result.success || result.error.is_some());
/// ```
pub struct ImagePipeline {
    config: PipelineConfig,
    cache: Option<Arc<ContentCache>>,
    counters: Counters,
}

impl ImagePipeline {
    pub fn new(config: PipelineConfig, cache: Option<Arc<ContentCache>>) -> Self {
        Self {
            config,
            cache,
            counters: Counters::default(),
        }
    }

    /// A pipeline with default settings and no cache.
    pub fn uncached() -> Self {
        Self::new(PipelineConfig::default(), None)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<ContentCache>> {
        self.cache.as_ref()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            decodes: self.counters.decodes.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.counters.cache_misses.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    // -------------------------------------------------------------------------
    // Stages
    // -------------------------------------------------------------------------

    /// Read and decode a DICOM file.
    ///
    /// # Errors
    /// - `FileRead` if the file cannot be read
    /// - `Decode` for malformed or truncated containers, unsupported transfer
    ///   syntaxes, and Pixel Data shorter than the pixel module requires
    pub fn load(&self, path: &Path) -> Result<DecodedImage, PipelineError> {
        let file = read_dicom(path, ParseOptions::default())?;
        let ds = &file.dataset;
        let metadata = ImageMetadata::from_file(&file);

        let rescale = Rescale {
            slope: ds.number(Tag::RESCALE_SLOPE).unwrap_or(1.0),
            intercept: ds.number(Tag::RESCALE_INTERCEPT).unwrap_or(0.0),
        };

        let (pixels, photometric) = match file.pixel_data() {
            Some(element) => {
                let layout = PixelLayout::from_dataset(ds)?;
                let data = decode_samples(&layout, &element.value, element.byte_order())?;
                let grid = PixelGrid {
                    frames: layout.frames,
                    rows: layout.rows,
                    columns: layout.columns,
                    data,
                };
                (Some(grid), layout.photometric)
            }
            None => {
                let photometric = ds
                    .string(Tag::PHOTOMETRIC_INTERPRETATION)
                    .map(|s| Photometric::parse(&s))
                    .unwrap_or_default();
                (None, photometric)
            }
        };

        self.counters.decodes.fetch_add(1, Ordering::Relaxed);
        debug!(
            path = %path.display(),
            transfer_syntax = file.transfer_syntax.name(),
            frames = pixels.as_ref().map_or(0, |p| p.frames),
            "decoded file"
        );

        Ok(DecodedImage {
            path: path.to_path_buf(),
            frame_count: pixels.as_ref().map_or(0, |p| p.frames),
            pixels,
            photometric,
            window: metadata.window(),
            rescale,
            metadata,
        })
    }

    /// Apply the modality rescale, then invert MONOCHROME1 so that higher
    /// values always display brighter.
    pub fn extract_pixels(&self, decoded: &DecodedImage) -> Result<PixelGrid, PipelineError> {
        let stored = decoded
            .pixels
            .as_ref()
            .ok_or_else(|| PipelineError::NoPixelData {
                path: decoded.path.clone(),
            })?;

        let Rescale { slope, intercept } = decoded.rescale;
        let mut grid = PixelGrid {
            frames: stored.frames,
            rows: stored.rows,
            columns: stored.columns,
            data: stored
                .data
                .iter()
                .map(|&v| (v as f64 * slope + intercept) as f32)
                .collect(),
        };

        if decoded.photometric.requires_inversion() {
            if let Some((lo, hi)) = grid.min_max() {
                for v in &mut grid.data {
                    *v = hi + lo - *v;
                }
            }
        }

        Ok(grid)
    }

    /// Run a full request, consulting and populating the cache.
    pub fn process(&self, request: &ProcessingRequest) -> ProcessingResult {
        let operation = self.operation_name(request);

        if let Err(e) = request.validate() {
            return self.fail(request, operation, e);
        }

        let cache = self.cache.as_ref().filter(|_| request.use_cache);
        if let Some(cache) = cache {
            let cached = cache
                .get(&request.file_path, &operation)
                .and_then(|payload| ProcessingResult::from_payload(&payload));
            if let Some(result) = cached {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!(path = %request.file_path.display(), operation = %operation, "served from cache");
                return result;
            }
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let result = match self.run(request, &operation) {
            Ok(result) => result,
            Err(e) => return self.fail(request, operation, e),
        };

        if let (Some(cache), Some(payload)) = (cache, result.to_payload()) {
            let output = &result.metadata.output;
            let mut metadata = Map::new();
            metadata.insert("format".to_string(), json!(output.format));
            metadata.insert("width".to_string(), json!(output.width));
            metadata.insert("height".to_string(), json!(output.height));
            metadata.insert("frame_index".to_string(), json!(result.metadata.frame.index));
            cache.store(&request.file_path, &operation, payload, metadata, true);
        }

        info!(
            path = %request.file_path.display(),
            format = %request.output_format,
            bytes = result.encoded_image.as_ref().map_or(0, |b| b.len()),
            "processed image"
        );
        result
    }

    fn run(
        &self,
        request: &ProcessingRequest,
        operation: &str,
    ) -> Result<ProcessingResult, PipelineError> {
        let decoded = self.load(&request.file_path)?;
        let grid = self.extract_pixels(&decoded)?;
        let (frame, selection) = select_frame(&grid, request.frame_index)?;
        if selection.default_applied {
            debug!(
                frame_count = selection.frame_count,
                "multi-frame file without explicit frame, using frame 0"
            );
        }

        let window = request
            .window
            .or_else(|| decoded.window.filter(|_| request.apply_windowing));
        let mut img = normalize(&frame, window);

        if let Some(method) = request.enhancement {
            img = enhance(&img, method);
        }
        if let Some(filter) = request.filter_type {
            img = apply_filter(&img, filter);
        }
        if let Some(size) = request.target_size {
            img = resize(&img, size, self.config.maintain_aspect);
        }

        let encoded = encode(&img, request.output_format, self.config.jpeg_quality)?;
        let thumbnail = make_thumbnail(
            &img,
            self.config.thumbnail_size,
            self.config.thumbnail_quality,
        )?;

        Ok(ProcessingResult {
            success: true,
            metadata: ProcessingMetadata {
                image: Some(decoded.metadata),
                frame: selection,
                output: OutputInfo {
                    format: Some(request.output_format),
                    width: img.width(),
                    height: img.height(),
                    size_bytes: encoded.len(),
                    enhancement: request.enhancement,
                    filter_type: request.filter_type,
                    window,
                },
                operation: operation.to_string(),
                from_cache: false,
            },
            encoded_image: Some(encoded),
            thumbnail: Some(thumbnail),
            error: None,
        })
    }

    fn fail(
        &self,
        request: &ProcessingRequest,
        operation: String,
        err: PipelineError,
    ) -> ProcessingResult {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        warn!(path = %request.file_path.display(), error = %err, "processing failed");
        ProcessingResult::failure(operation, &err)
    }

    /// Cache operation name for a request.
    ///
    /// Every option that changes the output occupies a fixed, delimited slot,
    /// so distinct requests never share a name.
    pub fn operation_name(&self, request: &ProcessingRequest) -> String {
        format!(
            "process:{}|enh={}|flt={}|fmt={}|size={}|fit={}|frame={}|win={}|q={}|thumb={}@{}",
            PROCESS_SCHEMA,
            request.enhancement.map_or("none", |e| e.as_str()),
            request.filter_type.map_or("none", |f| f.as_str()),
            request.output_format,
            request
                .target_size
                .map_or_else(|| "native".to_string(), |s| s.to_string()),
            if self.config.maintain_aspect { "pad" } else { "stretch" },
            request
                .frame_index
                .map_or_else(|| "default".to_string(), |i| i.to_string()),
            request.window_mode(),
            self.config.jpeg_quality,
            self.config.thumbnail_size,
            self.config.thumbnail_quality,
        )
    }

    // -------------------------------------------------------------------------
    // Auxiliary operations
    // -------------------------------------------------------------------------

    /// Header metadata without decoding pixel data, cached under `metadata`.
    pub fn metadata(&self, path: &Path, use_cache: bool) -> Result<ImageMetadata, PipelineError> {
        let cache = self.cache.as_ref().filter(|_| use_cache);
        if let Some(cache) = cache {
            let cached = cache
                .get(path, METADATA_OPERATION)
                .and_then(|p| p.field(METADATA_FIELD).cloned())
                .and_then(|v| serde_json::from_value::<ImageMetadata>(v).ok());
            if let Some(metadata) = cached {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(metadata);
            }
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let file = read_dicom(
            path,
            ParseOptions {
                stop_before_pixels: true,
            },
        )?;
        let metadata = ImageMetadata::from_file(&file);

        if let Some(cache) = cache {
            if let Ok(value) = serde_json::to_value(&metadata) {
                let payload = CachePayload::new().with_field(METADATA_FIELD, value);
                cache.store(path, METADATA_OPERATION, payload, Map::new(), true);
            }
        }
        Ok(metadata)
    }

    /// JPEG thumbnail of one frame using the file's window hints, cached
    /// under its own operation name.
    pub fn thumbnail(
        &self,
        path: &Path,
        frame_index: Option<usize>,
        use_cache: bool,
    ) -> Result<Bytes, PipelineError> {
        let operation = format!(
            "thumbnail:{}|frame={}|size={}|q={}",
            PROCESS_SCHEMA,
            frame_index.map_or_else(|| "default".to_string(), |i| i.to_string()),
            self.config.thumbnail_size,
            self.config.thumbnail_quality,
        );

        let cache = self.cache.as_ref().filter(|_| use_cache);
        if let Some(cache) = cache {
            if let Some(thumb) = cache
                .get(path, &operation)
                .and_then(|p| p.blob(THUMBNAIL_BLOB).cloned())
            {
                self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(thumb);
            }
            self.counters.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let decoded = self.load(path)?;
        let grid = self.extract_pixels(&decoded)?;
        let (frame, _) = select_frame(&grid, frame_index)?;
        let img = normalize(&frame, decoded.window);
        let thumb = make_thumbnail(
            &img,
            self.config.thumbnail_size,
            self.config.thumbnail_quality,
        )?;

        if let Some(cache) = cache {
            let payload = CachePayload::new()
                .with_field("frame_index", Value::from(frame_index.unwrap_or(0) as u64))
                .with_blob(THUMBNAIL_BLOB, thumb.clone());
            cache.store(path, &operation, payload, Map::new(), true);
        }
        Ok(thumb)
    }
}

fn read_dicom(path: &Path, options: ParseOptions) -> Result<DicomFile, PipelineError> {
    let data = fs::read(path).map_err(|e| PipelineError::FileRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(DicomFile::parse(Bytes::from(data), options)?)
}
