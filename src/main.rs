//! DICOM Pipeline - command-line front end.
//!
//! Processes single files through the image pipeline and manages the cache.

use std::fs;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dicom_pipeline::{
    config::{CacheCommand, Cli, Command, MetadataArgs, ProcessArgs},
    ContentCache, ImagePipeline,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let cache = (!cli.no_cache).then(|| Arc::new(ContentCache::new(cli.cache_config())));

    match &cli.command {
        Command::Process(args) => run_process(&cli, args, cache),
        Command::Metadata(args) => run_metadata(&cli, args, cache),
        Command::Cache(command) => match cache {
            Some(cache) => run_cache(command, &cache),
            None => {
                error!("Cache commands cannot be combined with --no-cache");
                ExitCode::FAILURE
            }
        },
    }
}

// =============================================================================
// Process Command
// =============================================================================

fn run_process(cli: &Cli, args: &ProcessArgs, cache: Option<Arc<ContentCache>>) -> ExitCode {
    let request = match args.to_request(!cli.no_cache) {
        Ok(request) => request,
        Err(e) => {
            error!("Invalid request: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pipeline = ImagePipeline::new(cli.pipeline_config(), cache);
    let result = pipeline.process(&request);

    let (Some(image), true) = (&result.encoded_image, result.success) else {
        error!(
            "Processing failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        return ExitCode::FAILURE;
    };

    let output = args.output_path(request.output_format);
    if let Err(e) = fs::write(&output, image) {
        error!("Failed to write {}: {}", output.display(), e);
        return ExitCode::FAILURE;
    }
    info!(
        "Wrote {} ({} bytes{})",
        output.display(),
        image.len(),
        if result.metadata.from_cache { ", cached" } else { "" }
    );

    if let (Some(path), Some(thumbnail)) = (&args.thumbnail, &result.thumbnail) {
        if let Err(e) = fs::write(path, thumbnail) {
            error!("Failed to write thumbnail {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        info!("Wrote thumbnail {}", path.display());
    }

    print_json(&result.metadata)
}

// =============================================================================
// Metadata Command
// =============================================================================

fn run_metadata(cli: &Cli, args: &MetadataArgs, cache: Option<Arc<ContentCache>>) -> ExitCode {
    let pipeline = ImagePipeline::new(cli.pipeline_config(), cache);
    match pipeline.metadata(&args.file, !cli.no_cache) {
        Ok(metadata) => print_json(&metadata),
        Err(e) => {
            error!("Failed to read metadata: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Cache Commands
// =============================================================================

fn run_cache(command: &CacheCommand, cache: &ContentCache) -> ExitCode {
    match command {
        CacheCommand::Stats => print_json(&cache.stats()),
        CacheCommand::Clear { file } => {
            cache.clear(file.as_deref());
            match file {
                Some(path) => info!("Cleared cached entries for {}", path.display()),
                None => info!("Cleared cache at {}", cache.config().cache_dir.display()),
            }
            ExitCode::SUCCESS
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so that JSON on stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "dicom_pipeline=debug"
    } else {
        "dicom_pipeline=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
