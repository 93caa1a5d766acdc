//! Content cache integration tests.
//!
//! Tests verify:
//! - Keys are deterministic and track file mtime and size
//! - A memoized request does not decode twice, across instances too
//! - Memory tier eviction is least-recently-used
//! - Corrupted blobs and indexes are recovered from
//! - Clearing by path leaves other files' entries alone

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use serde_json::Map;
use tempfile::TempDir;

use dicom_pipeline::cache::{blob_path, INDEX_FILE};
use dicom_pipeline::{
    cache_key, CacheConfig, CachePayload, ContentCache, ImagePipeline, PipelineConfig,
    ProcessingRequest,
};

use super::test_utils::DicomBuilder;

fn open_cache(dir: &Path) -> Arc<ContentCache> {
    Arc::new(ContentCache::new(CacheConfig::new(dir)))
}

fn cached_pipeline(cache: &Arc<ContentCache>) -> ImagePipeline {
    ImagePipeline::new(PipelineConfig::default(), Some(Arc::clone(cache)))
}

fn set_mtime(path: &Path, secs: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, 0)).unwrap();
}

// =============================================================================
// Key Derivation
// =============================================================================

#[test]
fn test_key_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "a.dcm");

    let key = cache_key(&path, "metadata").unwrap();
    assert_eq!(key, cache_key(&path, "metadata").unwrap());
    assert_eq!(key.len(), 64);
    assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    assert_ne!(key, cache_key(&path, "thumbnail").unwrap());
}

#[test]
fn test_key_tracks_mtime() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "a.dcm");

    set_mtime(&path, 1_700_000_000);
    let before = cache_key(&path, "metadata").unwrap();

    set_mtime(&path, 1_700_000_001);
    let touched = cache_key(&path, "metadata").unwrap();
    assert_ne!(before, touched);

    set_mtime(&path, 1_700_000_000);
    assert_eq!(cache_key(&path, "metadata").unwrap(), before);
}

#[test]
fn test_key_tracks_size() {
    let dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "a.dcm");
    set_mtime(&path, 1_700_000_000);
    let before = cache_key(&path, "metadata").unwrap();

    let mut bytes = fs::read(&path).unwrap();
    bytes.extend_from_slice(&[0, 0]);
    fs::write(&path, bytes).unwrap();
    set_mtime(&path, 1_700_000_000);

    assert_ne!(cache_key(&path, "metadata").unwrap(), before);
}

#[test]
fn test_key_requires_existing_file() {
    let dir = TempDir::new().unwrap();
    assert!(cache_key(&dir.path().join("missing.dcm"), "metadata").is_err());
}

// =============================================================================
// Memoization
// =============================================================================

#[test]
fn test_second_request_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(16, 16).write_to(dir.path(), "a.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    let request = ProcessingRequest::new(&path);

    let first = pipeline.process(&request);
    assert!(first.success);
    assert!(!first.metadata.from_cache);

    let second = pipeline.process(&request);
    assert!(second.success);
    assert!(second.metadata.from_cache);
    assert_eq!(second.encoded_image, first.encoded_image);
    assert_eq!(second.thumbnail, first.thumbnail);
    assert_eq!(second.metadata.output, first.metadata.output);
    assert_eq!(second.metadata.image, first.metadata.image);

    let stats = pipeline.stats();
    assert_eq!(stats.decodes, 1);
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
    assert_eq!(cache.stats().memory_hits, 1);
}

#[test]
fn test_disk_tier_survives_restart() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(16, 16).write_to(dir.path(), "a.dcm");
    let request = ProcessingRequest::new(&path);

    let first = cached_pipeline(&open_cache(cache_dir.path())).process(&request);
    assert!(cache_dir.path().join(INDEX_FILE).is_file());

    let cache = open_cache(cache_dir.path());
    assert_eq!(cache.stats().disk_items, 1);
    let pipeline = cached_pipeline(&cache);
    let second = pipeline.process(&request);

    assert!(second.metadata.from_cache);
    assert_eq!(second.encoded_image, first.encoded_image);
    assert_eq!(pipeline.stats().decodes, 0);
    assert_eq!(cache.stats().disk_hits, 1);

    // Promoted into memory by the disk hit
    pipeline.process(&request);
    assert_eq!(cache.stats().memory_hits, 1);
}

#[test]
fn test_modified_file_is_reprocessed() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(4, 4).write_to(dir.path(), "a.dcm");
    set_mtime(&path, 1_700_000_000);

    let pipeline = cached_pipeline(&open_cache(cache_dir.path()));
    let request = ProcessingRequest::new(&path);
    let first = pipeline.process(&request);

    DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");
    set_mtime(&path, 1_700_000_100);
    let second = pipeline.process(&request);

    assert!(!second.metadata.from_cache);
    assert_ne!(second.encoded_image, first.encoded_image);
    assert_eq!(second.metadata.output.width, 8);
    assert_eq!(pipeline.stats().decodes, 2);
}

#[test]
fn test_distinct_options_are_cached_separately() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let pipeline = cached_pipeline(&open_cache(cache_dir.path()));
    pipeline.process(&ProcessingRequest::new(&path));
    let framed = pipeline.process(&ProcessingRequest::new(&path).with_frame(0));

    assert!(!framed.metadata.from_cache);
    assert_eq!(pipeline.stats().decodes, 2);
}

#[test]
fn test_cache_bypass() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    let request = ProcessingRequest::new(&path).with_cache(false);
    pipeline.process(&request);
    pipeline.process(&request);

    assert_eq!(pipeline.stats().decodes, 2);
    let stats = cache.stats();
    assert_eq!(stats.memory_items, 0);
    assert_eq!(stats.disk_items, 0);
}

#[test]
fn test_failures_are_not_cached() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    let request = ProcessingRequest::new(&path).with_frame(5);
    assert!(!pipeline.process(&request).success);

    assert!(!cache.contains(&path, &pipeline.operation_name(&request)));
    assert_eq!(cache.stats().disk_items, 0);
}

#[test]
fn test_metadata_and_thumbnail_cached() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8)
        .window(40.0, 400.0)
        .write_to(dir.path(), "a.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);

    let metadata = pipeline.metadata(&path, true).unwrap();
    assert!(cache.contains(&path, "metadata"));
    assert_eq!(pipeline.metadata(&path, true).unwrap(), metadata);

    let thumbnail = pipeline.thumbnail(&path, None, true).unwrap();
    assert_eq!(pipeline.thumbnail(&path, None, true).unwrap(), thumbnail);

    let stats = pipeline.stats();
    assert_eq!(stats.cache_hits, 2);
    assert_eq!(stats.decodes, 1);
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_memory_tier_evicts_least_recently_used() {
    const MAX_ITEMS: usize = 5;
    const EXTRA: usize = 10;

    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "a.dcm");

    let cache =
        ContentCache::new(CacheConfig::new(cache_dir.path()).with_max_memory_items(MAX_ITEMS));
    let op = |i: usize| format!("op-{}", i);
    let payload = |i: usize| CachePayload::new().with_field("n", i as u64);

    for i in 0..MAX_ITEMS {
        cache.store(&path, &op(i), payload(i), Map::new(), false);
    }
    // op-0 is read before every insert, so it is never the oldest
    for i in MAX_ITEMS..MAX_ITEMS + EXTRA {
        assert!(cache.get(&path, &op(0)).is_some());
        cache.store(&path, &op(i), payload(i), Map::new(), false);
    }

    for i in 1..=EXTRA {
        assert!(!cache.contains(&path, &op(i)), "{} should be evicted", op(i));
    }
    assert!(cache.contains(&path, &op(0)));
    for i in EXTRA + 1..MAX_ITEMS + EXTRA {
        assert!(cache.contains(&path, &op(i)), "{} should remain", op(i));
    }

    let stats = cache.stats();
    assert_eq!(stats.memory_items, MAX_ITEMS);
    assert_eq!(stats.memory_evictions, EXTRA as u64);
    assert_eq!(stats.memory_hits, EXTRA as u64);
    assert_eq!(stats.disk_items, 0);
}

#[test]
fn test_disk_tier_respects_byte_budget() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(2, 2).write_to(dir.path(), "a.dcm");

    let cache = ContentCache::new(
        CacheConfig::new(cache_dir.path())
            .with_max_memory_items(1)
            .with_max_disk_bytes(2_500),
    );
    let payload = || CachePayload::new().with_blob("data", vec![7u8; 1_000]);

    cache.store(&path, "first", payload(), Map::new(), true);
    cache.store(&path, "second", payload(), Map::new(), true);
    cache.store(&path, "third", payload(), Map::new(), true);

    let stats = cache.stats();
    assert_eq!(stats.disk_items, 2);
    assert_eq!(stats.disk_evictions, 1);
    assert!(!cache.contains(&path, "first"));
    assert!(cache.contains(&path, "second"));
    assert!(cache.contains(&path, "third"));
}

// =============================================================================
// Recovery
// =============================================================================

#[test]
fn test_corrupted_blob_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let pipeline = cached_pipeline(&open_cache(cache_dir.path()));
    let request = ProcessingRequest::new(&path);
    let first = pipeline.process(&request);

    let operation = pipeline.operation_name(&request);
    let blob = blob_path(cache_dir.path(), &cache_key(&path, &operation).unwrap());
    assert!(blob.is_file());
    fs::write(&blob, b"garbage").unwrap();

    // Fresh instance so the memory tier cannot answer
    let cache = open_cache(cache_dir.path());
    assert!(cache.get(&path, &operation).is_none());
    assert!(!blob.exists());
    assert!(cache.is_disk_enabled());

    let pipeline = cached_pipeline(&cache);
    let again = pipeline.process(&request);
    assert!(again.success);
    assert!(!again.metadata.from_cache);
    assert_eq!(again.encoded_image, first.encoded_image);
    assert_eq!(pipeline.stats().decodes, 1);
    assert!(blob.is_file());
}

#[test]
fn test_corrupted_index_degrades_to_memory_only() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let index = cache_dir.path().join(INDEX_FILE);
    fs::write(&index, b"{ not json").unwrap();

    let cache = open_cache(cache_dir.path());
    assert!(!cache.is_disk_enabled());

    let pipeline = cached_pipeline(&cache);
    let request = ProcessingRequest::new(&path);
    assert!(pipeline.process(&request).success);
    assert!(pipeline.process(&request).metadata.from_cache);

    assert_eq!(fs::read(&index).unwrap(), b"{ not json");
    assert!(!cache.stats().disk_enabled);
}

#[test]
fn test_deleted_source_is_a_miss() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    assert!(pipeline.process(&ProcessingRequest::new(&path)).success);

    fs::remove_file(&path).unwrap();
    let result = pipeline.process(&ProcessingRequest::new(&path));
    assert!(!result.success);
    assert!(result.error.is_some());
}

// =============================================================================
// Clearing
// =============================================================================

#[test]
fn test_clear_by_path_is_isolated() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let a = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");
    let b = DicomBuilder::new(8, 8).write_to(dir.path(), "b.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    let op_a = pipeline.operation_name(&ProcessingRequest::new(&a));
    for path in [&a, &b] {
        pipeline.process(&ProcessingRequest::new(path));
        pipeline.metadata(path, true).unwrap();
    }
    assert_eq!(cache.stats().disk_items, 4);

    cache.clear(Some(a.as_path()));

    assert!(!cache.contains(&a, &op_a));
    assert!(!cache.contains(&a, "metadata"));
    assert!(cache.contains(&b, &op_a));
    assert!(cache.contains(&b, "metadata"));
    assert_eq!(cache.stats().disk_items, 2);

    // Survives a restart
    let reopened = open_cache(cache_dir.path());
    assert!(!reopened.contains(&a, "metadata"));
    assert!(reopened.contains(&b, "metadata"));
}

#[test]
fn test_clear_by_path_ignores_file_identity() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");
    set_mtime(&path, 1_700_000_000);

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    pipeline.metadata(&path, true).unwrap();

    // Touching the file orphans the old entry; clearing still finds it
    let later = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_500);
    filetime::set_file_mtime(&path, FileTime::from_system_time(later)).unwrap();
    cache.clear(Some(path.as_path()));

    let stats = cache.stats();
    assert_eq!(stats.memory_items, 0);
    assert_eq!(stats.disk_items, 0);
}

#[test]
fn test_clear_all() {
    let dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let path = DicomBuilder::new(8, 8).write_to(dir.path(), "a.dcm");

    let cache = open_cache(cache_dir.path());
    let pipeline = cached_pipeline(&cache);
    pipeline.process(&ProcessingRequest::new(&path));
    pipeline.metadata(&path, true).unwrap();

    cache.clear(None);

    let stats = cache.stats();
    assert_eq!(stats.memory_items, 0);
    assert_eq!(stats.disk_items, 0);
    assert_eq!(stats.disk_size_mb, 0.0);
    let blobs = fs::read_dir(cache_dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "blob"))
        .count();
    assert_eq!(blobs, 0);
}
