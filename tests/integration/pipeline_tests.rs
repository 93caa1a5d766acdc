//! End-to-end pipeline tests.
//!
//! Tests verify:
//! - Encoded output decodes back to the expected gray levels
//! - Windowing, flat images and MONOCHROME1 inversion
//! - Multi-frame selection (default, explicit, out of range)
//! - Resize, enhancement and filter options
//! - Failure reporting for missing files and unsupported formats

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use dicom_pipeline::{
    Enhancement, FilterType, ImagePipeline, OutputFormat, PipelineConfig, PipelineError,
    ProcessingRequest, ProcessingResult, TargetSize, Window,
};

use super::test_utils::{decode_gray, gray_values, is_valid_jpeg, is_valid_png, DicomBuilder};

/// Run an uncached request built from `path` and assert that it succeeded.
fn process(
    path: &Path,
    request: impl FnOnce(ProcessingRequest) -> ProcessingRequest,
) -> ProcessingResult {
    let result = ImagePipeline::uncached().process(&request(ProcessingRequest::new(path)));
    assert!(result.success, "processing failed: {:?}", result.error);
    result
}

// =============================================================================
// Normalization
// =============================================================================

#[test]
fn test_min_max_normalization() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(3, 1)
        .samples(vec![100, 150, 200])
        .write_to(dir.path(), "ramp.dcm");

    let result = process(&path, |r| r);
    let png = result.encoded_image.unwrap();
    assert!(is_valid_png(&png));
    assert_eq!(gray_values(&decode_gray(&png)), vec![0, 128, 255]);

    let output = &result.metadata.output;
    assert_eq!(output.format, Some(OutputFormat::Png));
    assert_eq!((output.width, output.height), (3, 1));
    assert_eq!(output.size_bytes, png.len());
    assert!(!result.metadata.from_cache);
}

#[test]
fn test_flat_image_is_black() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(4, 4)
        .samples(vec![700; 16])
        .write_to(dir.path(), "flat.dcm");

    let result = process(&path, |r| r);
    let img = decode_gray(&result.encoded_image.unwrap());
    assert!(img.pixels().all(|p| p.0[0] == 0));
}

#[test]
fn test_file_window_applied() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(5, 1)
        .samples(vec![0, 50, 128, 200, 255])
        .window(128.0, 100.0)
        .write_to(dir.path(), "windowed.dcm");

    let result = process(&path, |r| r);
    let values = gray_values(&decode_gray(&result.encoded_image.unwrap()));
    assert_eq!(values, vec![0, 0, 128, 255, 255]);
    assert_eq!(result.metadata.output.window, Some(Window::new(128.0, 100.0)));

    // Opting out falls back to min/max
    let result = process(&path, |r| r.without_windowing());
    let values = gray_values(&decode_gray(&result.encoded_image.unwrap()));
    assert_eq!(values, vec![0, 50, 128, 200, 255]);
    assert_eq!(result.metadata.output.window, None);
}

#[test]
fn test_explicit_window_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(5, 1)
        .samples(vec![0, 50, 128, 200, 255])
        .window(1000.0, 10.0)
        .write_to(dir.path(), "windowed.dcm");

    let result = process(&path, |r| r.with_window(Window::new(128.0, 100.0)));
    let values = gray_values(&decode_gray(&result.encoded_image.unwrap()));
    assert_eq!(values, vec![0, 0, 128, 255, 255]);
}

#[test]
fn test_non_positive_window_rejected() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "a.dcm");

    let request = ProcessingRequest::new(&path).with_window(Window::new(40.0, 0.0));
    let result = ImagePipeline::uncached().process(&request);
    assert!(!result.success);
    assert!(result.encoded_image.is_none());
    assert!(result.error.unwrap().contains("window width"));
}

#[test]
fn test_monochrome1_is_inverted() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(3, 1)
        .samples(vec![0, 100, 400])
        .photometric("MONOCHROME1")
        .write_to(dir.path(), "mono1.dcm");

    let pipeline = ImagePipeline::uncached();
    let image = pipeline.load(&path).unwrap();
    let grid = pipeline.extract_pixels(&image).unwrap();
    assert_eq!(grid.data, vec![400.0, 300.0, 0.0]);

    let result = process(&path, |r| r);
    let values = gray_values(&decode_gray(&result.encoded_image.unwrap()));
    assert_eq!(values, vec![255, 191, 0]);
}

#[test]
fn test_rescale_applied() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(3, 1)
        .samples(vec![0, 1000, 2000])
        .rescale(1.0, -1024.0)
        .write_to(dir.path(), "ct.dcm");

    let pipeline = ImagePipeline::uncached();
    let grid = pipeline
        .extract_pixels(&pipeline.load(&path).unwrap())
        .unwrap();
    assert_eq!(grid.data, vec![-1024.0, -24.0, 976.0]);
}

// =============================================================================
// Frame Selection
// =============================================================================

/// Three 2x2 frames with constant values 0, 50 and 100, windowed over 0..100.
fn volume(dir: &TempDir) -> PathBuf {
    let mut samples = vec![0; 4];
    samples.extend([50; 4]);
    samples.extend([100; 4]);
    DicomBuilder::new(2, 2)
        .frames(3)
        .samples(samples)
        .window(50.0, 100.0)
        .write_to(dir.path(), "volume.dcm")
}

#[test]
fn test_volume_defaults_to_first_frame() {
    let dir = TempDir::new().unwrap();
    let result = process(&volume(&dir), |r| r);

    let frame = result.metadata.frame;
    assert_eq!(frame.index, 0);
    assert_eq!(frame.frame_count, 3);
    assert!(frame.default_applied);
    assert_eq!(
        gray_values(&decode_gray(&result.encoded_image.unwrap())),
        vec![0; 4]
    );
}

#[test]
fn test_volume_explicit_frame() {
    let dir = TempDir::new().unwrap();
    let path = volume(&dir);

    let result = process(&path, |r| r.with_frame(1));
    assert_eq!(result.metadata.frame.index, 1);
    assert!(!result.metadata.frame.default_applied);
    assert_eq!(
        gray_values(&decode_gray(&result.encoded_image.unwrap())),
        vec![128; 4]
    );

    let result = process(&path, |r| r.with_frame(2));
    assert_eq!(
        gray_values(&decode_gray(&result.encoded_image.unwrap())),
        vec![255; 4]
    );
}

#[test]
fn test_volume_frame_out_of_range() {
    let dir = TempDir::new().unwrap();
    let path = volume(&dir);

    let pipeline = ImagePipeline::uncached();
    let result = pipeline.process(&ProcessingRequest::new(&path).with_frame(3));
    assert!(!result.success);
    assert!(result.encoded_image.is_none());
    assert!(result.thumbnail.is_none());
    let expected = PipelineError::FrameIndex {
        requested: 3,
        frame_count: 3,
    };
    assert_eq!(result.error, Some(expected.to_string()));
    assert_eq!(pipeline.stats().failures, 1);
}

#[test]
fn test_single_frame_ignores_default_flag() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "single.dcm");

    let result = process(&path, |r| r);
    assert_eq!(result.metadata.frame.frame_count, 1);
    assert!(!result.metadata.frame.default_applied);

    let result = ImagePipeline::uncached().process(&ProcessingRequest::new(&path).with_frame(1));
    assert!(!result.success);
}

// =============================================================================
// Output Options
// =============================================================================

#[test]
fn test_resize_pad_and_stretch() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(32, 16).write_to(dir.path(), "wide.dcm");
    let size = TargetSize::new(64, 64).unwrap();

    let result = process(&path, |r| r.with_target_size(size));
    let img = decode_gray(&result.encoded_image.unwrap());
    assert_eq!(img.dimensions(), (64, 64));
    // Letterbox bands stay black
    assert_eq!(img.get_pixel(32, 0).0[0], 0);
    assert_eq!(img.get_pixel(32, 63).0[0], 0);

    let stretch = PipelineConfig {
        maintain_aspect: false,
        ..Default::default()
    };
    let pipeline = ImagePipeline::new(stretch, None);
    let result = pipeline.process(&ProcessingRequest::new(&path).with_target_size(size));
    assert!(result.success);
    assert_eq!(result.metadata.output.height, 64);
    assert!(result.metadata.operation.contains("fit=stretch"));
}

#[test]
fn test_every_format_encodes() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(16, 16).write_to(dir.path(), "a.dcm");

    for format in [
        OutputFormat::Png,
        OutputFormat::Jpeg,
        OutputFormat::Tiff,
        OutputFormat::Bmp,
    ] {
        let result = process(&path, |r| r.with_format(format));
        let encoded = result.encoded_image.unwrap();
        assert_eq!(decode_gray(&encoded).dimensions(), (16, 16), "{}", format);
        if format == OutputFormat::Jpeg {
            assert!(is_valid_jpeg(&encoded));
        }
    }
}

#[test]
fn test_webp_is_not_a_format() {
    let err = "WEBP".parse::<OutputFormat>().unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    assert!(err.to_string().contains("WEBP"));
}

#[test]
fn test_enhancement_and_filter_recorded() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(32, 32).write_to(dir.path(), "a.dcm");

    let result = process(&path, |r| {
        r.with_enhancement(Enhancement::Clahe)
            .with_filter(FilterType::Median)
    });
    assert_eq!(result.metadata.output.enhancement, Some(Enhancement::Clahe));
    assert_eq!(result.metadata.output.filter_type, Some(FilterType::Median));
    assert_eq!(decode_gray(&result.encoded_image.unwrap()).dimensions(), (32, 32));
}

#[test]
fn test_unknown_names_are_skipped() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let request = ProcessingRequest::new(&path)
        .with_enhancement_name("retinex")
        .with_filter_name("sobel");
    assert_eq!(request.enhancement, None);
    assert_eq!(request.filter_type, None);

    let plain = process(&path, |r| r);
    let result = ImagePipeline::uncached().process(&request);
    assert!(result.success);
    assert_eq!(result.encoded_image, plain.encoded_image);
}

#[test]
fn test_thumbnail_always_produced() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(40, 20).write_to(dir.path(), "a.dcm");

    let result = process(&path, |r| r.with_format(OutputFormat::Bmp));
    let thumbnail = result.thumbnail.unwrap();
    assert!(is_valid_jpeg(&thumbnail));
    assert_eq!(decode_gray(&thumbnail).dimensions(), (256, 256));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_missing_file_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.dcm");

    let result = ImagePipeline::uncached().process(&ProcessingRequest::new(&path));
    assert!(!result.success);
    assert!(result.encoded_image.is_none());
    assert!(result.error.unwrap().contains("absent.dcm"));
}

#[test]
fn test_no_pixel_data_fails() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(4, 4)
        .without_pixels()
        .write_to(dir.path(), "header.dcm");

    let result = ImagePipeline::uncached().process(&ProcessingRequest::new(&path));
    assert!(!result.success);
    assert!(result.error.unwrap().contains("No pixel data"));
}
