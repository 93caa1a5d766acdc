//! In-process memory tier.
//!
//! An LRU map from cache key to payload, bounded by item count. The tier is
//! not synchronized itself; [`ContentCache`](super::ContentCache) owns it
//! behind its state mutex.

use std::path::{Path, PathBuf};

use lru::LruCache;

use super::payload::CachePayload;

/// Default maximum number of payloads held in memory
pub const DEFAULT_MAX_MEMORY_ITEMS: usize = 100;

#[derive(Debug, Clone)]
struct MemoryEntry {
    payload: CachePayload,

    /// Absolute source path, kept for clear-by-path
    source_path: PathBuf,
}

/// LRU memory tier with an item-count bound.
///
/// The underlying `LruCache` is unbounded; the bound is enforced explicitly
/// after each insert so evictions can be counted and a bound of zero
/// (memory tier disabled) is representable.
pub struct MemoryTier {
    entries: LruCache<String, MemoryEntry>,
    max_items: usize,
}

impl MemoryTier {
    pub fn new(max_items: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_items,
        }
    }

    /// Get a payload, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<CachePayload> {
        self.entries.get(key).map(|entry| entry.payload.clone())
    }

    /// Check for a key without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains(key)
    }

    /// Insert or replace a payload, then evict down to the bound.
    ///
    /// Returns the number of entries evicted.
    pub fn put(&mut self, key: String, payload: CachePayload, source_path: &Path) -> usize {
        self.entries.put(
            key,
            MemoryEntry {
                payload,
                source_path: source_path.to_path_buf(),
            },
        );

        let mut evicted = 0;
        while self.entries.len() > self.max_items {
            match self.entries.pop_lru() {
                Some(_) => evicted += 1,
                None => break,
            }
        }
        evicted
    }

    /// Remove every entry derived from `source_path`.
    pub fn remove_source(&mut self, source_path: &Path) -> usize {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.source_path == source_path)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.entries.pop(key);
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }
}
