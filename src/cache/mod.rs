//! Two-tier content cache for derived artifacts.
//!
//! # Architecture
//!
//! ```text
//! get(path, operation)
//!        │
//!        ▼
//!   FileIdentity::of(path) ──► key = sha256(path, mtime, size, operation)
//!        │
//!        ▼
//! ┌──────────────┐  miss  ┌──────────────────────────────┐
//! │ MemoryTier   │ ─────► │ DiskTier                     │
//! │ LRU, N items │ ◄───── │ cache_metadata.json + *.blob │
//! └──────────────┘promote└──────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`ContentCache`]: the public entry point, shareable via `Arc`
//! - [`CachePayload`]: JSON fields plus named binary sections
//! - [`cache_key`]: key derivation, exposed for diagnostics and tests
//! - [`DiskTier`] / [`MemoryTier`]: the two tiers, driven by `ContentCache`

mod disk;
mod key;
mod memory;
mod payload;
mod store;

pub use disk::{blob_path, DiskTier, IndexRecord, DEFAULT_MAX_DISK_BYTES, INDEX_FILE};
pub use key::{cache_key, FileIdentity};
pub use memory::{MemoryTier, DEFAULT_MAX_MEMORY_ITEMS};
pub use payload::{CachePayload, EnvelopeError, ENVELOPE_VERSION};
pub use store::{CacheConfig, CacheStats, ContentCache};
