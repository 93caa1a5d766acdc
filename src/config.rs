//! Command-line configuration for the `dicom-pipeline` binary.
//!
//! # Environment Variables
//!
//! Global options can be set via environment variables with the `DICOM_` prefix:
//!
//! - `DICOM_CACHE_DIR` - Cache directory (default: ./dicom_cache)
//! - `DICOM_CACHE_MEMORY_ITEMS` - Memory tier bound in items (default: 100)
//! - `DICOM_CACHE_DISK_MB` - Disk tier bound in megabytes (default: 500)
//! - `DICOM_JPEG_QUALITY` - JPEG output quality (default: 95)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cache::{CacheConfig, DEFAULT_MAX_MEMORY_ITEMS};
use crate::pipeline::{
    OutputFormat, PipelineConfig, ProcessingRequest, TargetSize, Window, DEFAULT_JPEG_QUALITY,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "dicom_cache";

/// Default disk tier bound in megabytes.
pub const DEFAULT_MAX_DISK_SIZE_MB: u64 = 500;

// =============================================================================
// CLI Arguments
// =============================================================================

/// DICOM Pipeline - decode, normalize, enhance and cache DICOM images.
#[derive(Parser, Debug, Clone)]
#[command(name = "dicom-pipeline")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory for the on-disk cache tier.
    #[arg(long, global = true, default_value = DEFAULT_CACHE_DIR, env = "DICOM_CACHE_DIR")]
    pub cache_dir: PathBuf,

    /// Maximum number of entries in the memory tier.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_MEMORY_ITEMS, env = "DICOM_CACHE_MEMORY_ITEMS")]
    pub max_memory_items: usize,

    /// Maximum total size of the disk tier in megabytes.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_DISK_SIZE_MB, env = "DICOM_CACHE_DISK_MB")]
    pub max_disk_size_mb: u64,

    /// JPEG quality for encoded output (1-100).
    #[arg(long, global = true, default_value_t = DEFAULT_JPEG_QUALITY, env = "DICOM_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Bypass the cache entirely.
    #[arg(long, global = true, default_value_t = false)]
    pub no_cache: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode, transform and encode one DICOM file.
    Process(ProcessArgs),

    /// Print header metadata of a DICOM file as JSON.
    Metadata(MetadataArgs),

    /// Inspect or clear the cache.
    #[command(subcommand)]
    Cache(CacheCommand),
}

#[derive(Args, Debug, Clone)]
pub struct ProcessArgs {
    /// Input DICOM file.
    pub file: PathBuf,

    /// Output file (default: input path with the format's extension).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format: PNG, JPEG, TIFF or BMP.
    #[arg(short, long, default_value = "PNG")]
    pub format: String,

    /// Enhancement: clahe, histogram_eq, gamma, adaptive_eq, unsharp_mask.
    #[arg(long)]
    pub enhancement: Option<String>,

    /// Filter: gaussian, median, bilateral, edge_enhance.
    #[arg(long)]
    pub filter: Option<String>,

    /// Target size as WIDTHxHEIGHT.
    #[arg(long, value_parser = parse_target_size)]
    pub size: Option<TargetSize>,

    /// Stretch to the target size instead of fitting and padding.
    #[arg(long, default_value_t = false)]
    pub stretch: bool,

    /// Frame of a multi-frame file (default: first frame).
    #[arg(long)]
    pub frame: Option<usize>,

    /// Window center; requires --window-width.
    #[arg(long, requires = "window_width", allow_hyphen_values = true)]
    pub window_center: Option<f64>,

    /// Window width; requires --window-center.
    #[arg(long, requires = "window_center")]
    pub window_width: Option<f64>,

    /// Ignore the file's window hints and stretch min/max instead.
    #[arg(long, default_value_t = false)]
    pub no_windowing: bool,

    /// Also write the JPEG thumbnail to this path.
    #[arg(long)]
    pub thumbnail: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MetadataArgs {
    /// Input DICOM file.
    pub file: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Print cache occupancy and counters as JSON.
    Stats,

    /// Remove cached entries for one file, or everything.
    Clear {
        /// Source file whose entries should be removed.
        file: Option<PathBuf>,
    },
}

impl Cli {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.cache_config().validate()?;
        self.pipeline_config().validate()?;

        if let Command::Process(args) = &self.command {
            args.format
                .parse::<OutputFormat>()
                .map_err(|e| e.to_string())?;
            if let Some(width) = args.window_width {
                if width <= 0.0 {
                    return Err("window_width must be greater than 0".to_string());
                }
            }
        }
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(&self.cache_dir)
            .with_max_memory_items(self.max_memory_items)
            .with_max_disk_size_mb(self.max_disk_size_mb)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let maintain_aspect = match &self.command {
            Command::Process(args) => !args.stretch,
            _ => true,
        };
        PipelineConfig {
            jpeg_quality: self.jpeg_quality,
            maintain_aspect,
            ..Default::default()
        }
    }
}

impl ProcessArgs {
    /// Build the pipeline request. Unknown enhancement or filter names are
    /// logged and skipped.
    pub fn to_request(&self, use_cache: bool) -> Result<ProcessingRequest, String> {
        let format = self
            .format
            .parse::<OutputFormat>()
            .map_err(|e| e.to_string())?;

        let mut request = ProcessingRequest::new(&self.file)
            .with_format(format)
            .with_cache(use_cache);
        if let Some(name) = &self.enhancement {
            request = request.with_enhancement_name(name);
        }
        if let Some(name) = &self.filter {
            request = request.with_filter_name(name);
        }
        if let Some(size) = self.size {
            request = request.with_target_size(size);
        }
        if let Some(frame) = self.frame {
            request = request.with_frame(frame);
        }
        if let (Some(center), Some(width)) = (self.window_center, self.window_width) {
            request = request.with_window(Window::new(center, width));
        }
        if self.no_windowing {
            request = request.without_windowing();
        }
        Ok(request)
    }

    /// Output path, defaulting to the input path with the format's extension.
    pub fn output_path(&self, format: OutputFormat) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| self.file.with_extension(format.extension()))
    }
}

/// Parse `WIDTHxHEIGHT`.
pub fn parse_target_size(s: &str) -> Result<TargetSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid width '{}': {}", w, e))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid height '{}': {}", h, e))?;
    TargetSize::new(width, height).map_err(|e| e.to_string())
}

// =============================================================================
// Tests
// =============================================================================
