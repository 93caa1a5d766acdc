//! Cache key derivation.
//!
//! A key fingerprints *which bytes* a cached artifact was derived from and
//! *how*: the absolute source path, its modification time and size, and the
//! operation name. Editing or replacing the file changes mtime or size, so
//! stale artifacts are simply never looked up again.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Identity of a source file at the moment a key is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    /// Absolute (not canonicalized) path
    pub path: PathBuf,

    /// Modification time in nanoseconds relative to the Unix epoch
    pub mtime_ns: i128,

    /// File size in bytes
    pub size: u64,
}

impl FileIdentity {
    /// Stat `path` and capture its identity.
    pub fn of(path: &Path) -> Result<Self, CacheError> {
        let unavailable = |source| CacheError::SourceUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let absolute = absolute_path(path);
        let meta = fs::metadata(&absolute).map_err(unavailable)?;
        let modified = meta.modified().map_err(unavailable)?;
        let mtime_ns = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i128,
            Err(e) => -(e.duration().as_nanos() as i128),
        };

        Ok(Self {
            path: absolute,
            mtime_ns,
            size: meta.len(),
        })
    }

    /// Hex SHA-256 over the length-prefixed identity fields and `operation`.
    pub fn key_for(&self, operation: &str) -> String {
        let path_bytes = self.path.as_os_str().as_encoded_bytes();

        let mut hasher = Sha256::new();
        hasher.update((path_bytes.len() as u64).to_le_bytes());
        hasher.update(path_bytes);
        hasher.update(self.mtime_ns.to_le_bytes());
        hasher.update(self.size.to_le_bytes());
        hasher.update((operation.len() as u64).to_le_bytes());
        hasher.update(operation.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Derive the cache key for `operation` applied to the file at `path`.
///
/// # Errors
/// `SourceUnavailable` if the file does not exist or cannot be stat'ed.
pub fn cache_key(path: &Path, operation: &str) -> Result<String, CacheError> {
    Ok(FileIdentity::of(path)?.key_for(operation))
}

/// Make `path` absolute against the current directory without resolving links.
pub(crate) fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
