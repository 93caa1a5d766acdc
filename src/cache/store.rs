//! Two-tier content cache.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::CacheError;

use super::disk::{DiskTier, DEFAULT_MAX_DISK_BYTES};
use super::key::{absolute_path, FileIdentity};
use super::memory::{MemoryTier, DEFAULT_MAX_MEMORY_ITEMS};
use super::payload::CachePayload;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// =============================================================================
// Configuration
// =============================================================================

/// Cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory holding the index and blob files
    pub cache_dir: PathBuf,

    /// Memory tier bound (item count)
    pub max_memory_items: usize,

    /// Disk tier bound (aggregate blob bytes)
    pub max_disk_bytes: u64,
}

impl CacheConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_memory_items: DEFAULT_MAX_MEMORY_ITEMS,
            max_disk_bytes: DEFAULT_MAX_DISK_BYTES,
        }
    }

    pub fn with_max_memory_items(mut self, items: usize) -> Self {
        self.max_memory_items = items;
        self
    }

    pub fn with_max_disk_bytes(mut self, bytes: u64) -> Self {
        self.max_disk_bytes = bytes;
        self
    }

    pub fn with_max_disk_size_mb(self, mb: u64) -> Self {
        self.with_max_disk_bytes(mb.saturating_mul(1024 * 1024))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_memory_items == 0 {
            return Err("max_memory_items must be greater than 0".to_string());
        }
        if self.max_disk_bytes == 0 {
            return Err("max_disk_size must be greater than 0".to_string());
        }
        if self.cache_dir.as_os_str().is_empty() {
            return Err("cache_dir must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new("dicom_cache")
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Snapshot of cache occupancy and counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub memory_items: usize,
    pub disk_items: usize,
    pub disk_size_mb: f64,
    pub max_memory_items: usize,
    pub max_disk_size_mb: f64,

    /// False once the disk tier has been disabled by an index failure
    pub disk_enabled: bool,

    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub memory_evictions: u64,
    pub disk_evictions: u64,
}

// =============================================================================
// ContentCache
// =============================================================================

struct CacheState {
    memory: MemoryTier,

    /// `None` once degraded to memory-only
    disk: Option<DiskTier>,

    memory_hits: u64,
    disk_hits: u64,
    misses: u64,
    memory_evictions: u64,
    disk_evictions: u64,
}

/// Memory + disk cache keyed by (source file identity, operation name).
///
/// All state sits behind one mutex, so a single instance can be shared via
/// `Arc` between threads. Two processes must not share one directory.
///
/// No method fails outward: cache trouble is logged and turns into a miss, a
/// skipped write, or (for index I/O failures) memory-only operation for the
/// rest of the session.
pub struct ContentCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl ContentCache {
    /// Open a cache rooted at `config.cache_dir`.
    ///
    /// If the directory or its index is unusable the cache starts in
    /// memory-only mode.
    pub fn new(config: CacheConfig) -> Self {
        let disk = match DiskTier::open(&config.cache_dir, config.max_disk_bytes) {
            Ok(disk) => Some(disk),
            Err(e) => {
                warn!(error = %e, "disk cache unavailable, running memory-only");
                None
            }
        };

        info!(
            cache_dir = %config.cache_dir.display(),
            max_memory_items = config.max_memory_items,
            max_disk_bytes = config.max_disk_bytes,
            disk_enabled = disk.is_some(),
            "content cache ready"
        );

        Self {
            state: Mutex::new(CacheState {
                memory: MemoryTier::new(config.max_memory_items),
                disk,
                memory_hits: 0,
                disk_hits: 0,
                misses: 0,
                memory_evictions: 0,
                disk_evictions: 0,
            }),
            config,
        }
    }

    /// Look up the payload for `operation` applied to the file at `path`.
    ///
    /// Checks memory, then disk; a disk hit is promoted into memory. Returns
    /// `None` if the file is missing or nothing is cached under its current
    /// identity.
    pub fn get(&self, path: &Path, operation: &str) -> Option<CachePayload> {
        let key = match FileIdentity::of(path) {
            Ok(identity) => identity.key_for(operation),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "cache lookup skipped");
                return None;
            }
        };

        let mut state = self.lock();
        if let Some(payload) = state.memory.get(&key) {
            state.memory_hits += 1;
            debug!(key = %key, operation, "memory cache hit");
            return Some(payload);
        }

        let lookup = state.disk.as_mut().map(|disk| disk.get(&key));
        match lookup {
            Some(Ok(Some((payload, source_path)))) => {
                state.disk_hits += 1;
                let evicted = state.memory.put(key.clone(), payload.clone(), &source_path);
                state.memory_evictions += evicted as u64;
                debug!(key = %key, operation, "disk cache hit");
                Some(payload)
            }
            Some(Err(e)) => {
                degrade(&mut state, e);
                state.misses += 1;
                None
            }
            Some(Ok(None)) | None => {
                state.misses += 1;
                debug!(key = %key, operation, "cache miss");
                None
            }
        }
    }

    /// Store `payload` for `operation` applied to the file at `path`.
    ///
    /// Always writes the memory tier; with `persist_to_disk` also writes a blob
    /// and an index record carrying `metadata`. Eviction runs in both tiers
    /// afterwards.
    pub fn store(
        &self,
        path: &Path,
        operation: &str,
        payload: CachePayload,
        metadata: Map<String, Value>,
        persist_to_disk: bool,
    ) {
        let identity = match FileIdentity::of(path) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cache store skipped");
                return;
            }
        };
        let key = identity.key_for(operation);

        let mut state = self.lock();
        if persist_to_disk {
            let written = state
                .disk
                .as_mut()
                .map(|disk| disk.put(&key, &payload, &identity.path, operation, metadata));
            match written {
                Some(Ok(evicted)) => state.disk_evictions += evicted as u64,
                Some(Err(e)) => degrade(&mut state, e),
                None => {}
            }
        }

        let evicted = state.memory.put(key.clone(), payload, &identity.path);
        state.memory_evictions += evicted as u64;
        debug!(key = %key, operation, persist_to_disk, "cached payload");
    }

    /// Whether an entry exists for the current identity of `path`, in either
    /// tier, without touching recency.
    pub fn contains(&self, path: &Path, operation: &str) -> bool {
        let Ok(identity) = FileIdentity::of(path) else {
            return false;
        };
        let key = identity.key_for(operation);
        let state = self.lock();
        state.memory.contains(&key) || state.disk.as_ref().is_some_and(|d| d.contains(&key))
    }

    /// Remove cached entries.
    ///
    /// With a path, every operation cached for that file (any mtime or size)
    /// is removed from both tiers; the file itself need not exist. Without a
    /// path everything is removed, including orphaned blob files.
    pub fn clear(&self, path: Option<&Path>) {
        let mut state = self.lock();
        match path {
            Some(path) => {
                let source = absolute_path(path);
                let memory = state.memory.remove_source(&source);
                let disk = state.disk.as_mut().map(|d| d.remove_source(&source));
                let disk = match disk {
                    Some(Ok(n)) => n,
                    Some(Err(e)) => {
                        degrade(&mut state, e);
                        0
                    }
                    None => 0,
                };
                info!(path = %source.display(), memory, disk, "cleared cache entries for file");
            }
            None => {
                state.memory.clear();
                let cleared = state.disk.as_mut().map(|d| d.clear());
                if let Some(Err(e)) = cleared {
                    degrade(&mut state, e);
                }
                info!("cleared entire cache");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let (disk_items, disk_bytes) = state
            .disk
            .as_ref()
            .map_or((0, 0), |d| (d.len(), d.total_bytes()));

        CacheStats {
            memory_items: state.memory.len(),
            disk_items,
            disk_size_mb: disk_bytes as f64 / BYTES_PER_MB,
            max_memory_items: self.config.max_memory_items,
            max_disk_size_mb: self.config.max_disk_bytes as f64 / BYTES_PER_MB,
            disk_enabled: state.disk.is_some(),
            memory_hits: state.memory_hits,
            disk_hits: state.disk_hits,
            misses: state.misses,
            memory_evictions: state.memory_evictions,
            disk_evictions: state.disk_evictions,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_disk_enabled(&self) -> bool {
        self.lock().disk.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn degrade(state: &mut CacheState, err: CacheError) {
    warn!(error = %err, "cache index unavailable, disabling disk tier for this session");
    state.disk = None;
}
