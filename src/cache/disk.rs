//! On-disk tier.
//!
//! # Layout
//!
//! ```text
//! <cache_dir>/cache_metadata.json    index: key -> IndexRecord
//! <cache_dir>/<key>.blob             payload envelope, one per key
//! ```
//!
//! Both files are replaced via write-to-temp-then-rename. The index is the
//! source of truth for what exists; on open it is reconciled with the
//! directory so a crash between blob write and index write leaves no
//! dangling state behind.
//!
//! # Error Contract
//!
//! Every method that returns `Err` is reporting an index I/O failure, which
//! the owning cache treats as fatal for the disk tier. Blob-level problems
//! (missing, unreadable or corrupt blob files, failed blob writes) are logged
//! and absorbed here.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::io::write_atomic;

use super::payload::CachePayload;

/// Index file name inside the cache directory
pub const INDEX_FILE: &str = "cache_metadata.json";

/// Blob file extension
pub const BLOB_EXTENSION: &str = "blob";

/// Default disk budget: 500 MB
pub const DEFAULT_MAX_DISK_BYTES: u64 = 500 * 1024 * 1024;

/// One index record per disk entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Size of the blob file in bytes
    pub file_size: u64,

    /// Seconds since the Unix epoch
    pub created_at: f64,

    /// Seconds since the Unix epoch
    pub last_accessed: f64,

    /// Monotonic access counter; the smallest value is evicted first
    #[serde(default)]
    pub access_seq: u64,

    pub source_path: PathBuf,

    #[serde(default)]
    pub operation: String,

    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Disk tier state: the loaded index plus accounting.
pub struct DiskTier {
    dir: PathBuf,
    index: BTreeMap<String, IndexRecord>,
    max_bytes: u64,
    total_bytes: u64,
    next_seq: u64,
}

impl DiskTier {
    /// Open (creating if needed) a cache directory and reconcile its index.
    ///
    /// # Errors
    /// `IndexIo` if the directory cannot be created or the index exists but
    /// cannot be read or parsed. A corrupt index is left untouched on disk.
    pub fn open(dir: &Path, max_bytes: u64) -> Result<Self, CacheError> {
        fs::create_dir_all(dir).map_err(|e| index_io(dir, e))?;

        let index_path = dir.join(INDEX_FILE);
        let index: BTreeMap<String, IndexRecord> = match fs::read(&index_path) {
            Ok(data) => serde_json::from_slice(&data).map_err(|e| index_io(&index_path, e))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(index_io(&index_path, e)),
        };

        let mut tier = Self {
            dir: dir.to_path_buf(),
            index,
            max_bytes,
            total_bytes: 0,
            next_seq: 0,
        };

        let changed = tier.reconcile()?;
        tier.recount();
        let evicted = tier.evict();
        if changed || evicted > 0 {
            tier.persist()?;
        }

        debug!(
            dir = %tier.dir.display(),
            entries = tier.index.len(),
            bytes = tier.total_bytes,
            "opened disk cache"
        );
        Ok(tier)
    }

    /// Drop records without a blob and delete blobs without a record.
    fn reconcile(&mut self) -> Result<bool, CacheError> {
        let before = self.index.len();
        let dir = self.dir.clone();
        self.index.retain(|key, _| {
            let present = blob_path(&dir, key).is_file();
            if !present {
                debug!(key = %key, "dropping index record with missing blob");
            }
            present
        });
        let mut changed = self.index.len() != before;

        let entries = fs::read_dir(&self.dir).map_err(|e| index_io(&self.dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            let is_blob = path.extension().is_some_and(|ext| ext == BLOB_EXTENSION);
            let is_temp = path.extension().is_some_and(|ext| ext == "tmp");
            let known = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .is_some_and(|stem| self.index.contains_key(stem));

            if is_temp || (is_blob && !known) {
                debug!(path = %path.display(), "removing orphaned cache file");
                remove_file_quiet(&path);
                changed = true;
            }
        }

        Ok(changed)
    }

    fn recount(&mut self) {
        self.total_bytes = self.index.values().map(|r| r.file_size).sum();
        self.next_seq = self
            .index
            .values()
            .map(|r| r.access_seq)
            .max()
            .map_or(0, |seq| seq + 1);
    }

    /// Read and decode the blob for `key`, updating its recency on a hit.
    ///
    /// A missing or corrupt blob is removed together with its record and
    /// reported as a miss.
    pub fn get(&mut self, key: &str) -> Result<Option<(CachePayload, PathBuf)>, CacheError> {
        if !self.index.contains_key(key) {
            return Ok(None);
        }

        let path = blob_path(&self.dir, key);
        let decoded = match fs::read(&path) {
            Ok(data) => CachePayload::decode(Bytes::from(data)).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match decoded {
            Ok(payload) => {
                let seq = self.bump_seq();
                let source_path = match self.index.get_mut(key) {
                    Some(record) => {
                        record.last_accessed = unix_now();
                        record.access_seq = seq;
                        record.source_path.clone()
                    }
                    None => return Ok(None),
                };
                self.persist()?;
                Ok(Some((payload, source_path)))
            }
            Err(reason) => {
                let err = CacheError::Corruption {
                    key: key.to_string(),
                    reason,
                };
                warn!(error = %err, "discarding unreadable cache entry");
                self.remove_entry(key);
                self.persist()?;
                Ok(None)
            }
        }
    }

    /// Write a blob and record it in the index, then evict over budget.
    ///
    /// Returns the number of entries evicted. A failed blob write is logged and
    /// leaves the tier unchanged.
    pub fn put(
        &mut self,
        key: &str,
        payload: &CachePayload,
        source_path: &Path,
        operation: &str,
        metadata: Map<String, Value>,
    ) -> Result<usize, CacheError> {
        let encoded = match payload.encode() {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to encode cache payload");
                return Ok(0);
            }
        };
        if let Err(e) = write_atomic(&blob_path(&self.dir, key), &encoded) {
            let err = CacheError::from(e);
            warn!(key = %key, error = %err, "failed to write cache blob");
            return Ok(0);
        }

        let now = unix_now();
        let seq = self.bump_seq();
        let record = IndexRecord {
            file_size: encoded.len() as u64,
            created_at: now,
            last_accessed: now,
            access_seq: seq,
            source_path: source_path.to_path_buf(),
            operation: operation.to_string(),
            metadata,
        };
        if let Some(old) = self.index.insert(key.to_string(), record) {
            self.total_bytes = self.total_bytes.saturating_sub(old.file_size);
        }
        self.total_bytes += encoded.len() as u64;

        let evicted = self.evict();
        self.persist()?;
        Ok(evicted)
    }

    /// Evict least recently accessed entries until within the byte budget.
    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.total_bytes > self.max_bytes {
            let victim = self
                .index
                .iter()
                .min_by_key(|(_, record)| record.access_seq)
                .map(|(key, _)| key.clone());
            let Some(key) = victim else { break };

            debug!(key = %key, "evicting disk cache entry");
            self.remove_entry(&key);
            evicted += 1;
        }
        evicted
    }

    /// Remove every entry whose source is `source_path`.
    pub fn remove_source(&mut self, source_path: &Path) -> Result<usize, CacheError> {
        let keys: Vec<String> = self
            .index
            .iter()
            .filter(|(_, record)| record.source_path == source_path)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.remove_entry(key);
        }
        if !keys.is_empty() {
            self.persist()?;
        }
        Ok(keys.len())
    }

    /// Remove every entry and every blob file in the directory.
    pub fn clear(&mut self) -> Result<usize, CacheError> {
        let removed = self.index.len();
        self.index.clear();
        self.total_bytes = 0;

        let entries = fs::read_dir(&self.dir).map_err(|e| index_io(&self.dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path
                .extension()
                .is_some_and(|ext| ext == BLOB_EXTENSION || ext == "tmp")
            {
                remove_file_quiet(&path);
            }
        }

        self.persist()?;
        Ok(removed)
    }

    fn remove_entry(&mut self, key: &str) {
        if let Some(record) = self.index.remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(record.file_size);
        }
        remove_file_quiet(&blob_path(&self.dir, key));
    }

    fn persist(&self) -> Result<(), CacheError> {
        let path = self.dir.join(INDEX_FILE);
        let json = serde_json::to_vec_pretty(&self.index).map_err(|e| index_io(&path, e))?;
        write_atomic(&path, &json).map_err(|e| index_io(&path, e))
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn record(&self, key: &str) -> Option<&IndexRecord> {
        self.index.get(key)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Path of the blob file for `key`.
pub fn blob_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.{}", key, BLOB_EXTENSION))
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn index_io(path: &Path, err: impl std::fmt::Display) -> CacheError {
    CacheError::IndexIo {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn remove_file_quiet(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove cache file"),
    }
}
