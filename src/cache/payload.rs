//! Cached payloads and their on-disk envelope.
//!
//! # Blob Envelope (little-endian)
//!
//! ```text
//! magic     "DCMB"
//! u16       version
//! u32       fields length, then that many bytes of JSON (an object)
//! u16       section count
//! repeated: u16 name length, name (UTF-8), u64 data length, data
//! ```
//!
//! The envelope is self-describing and versioned so that entries written by a
//! different build are rejected as corrupt instead of misread.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::io::{read_u16_le, read_u32_le, read_u64_le};

const MAGIC: &[u8; 4] = b"DCMB";

/// Current envelope version
pub const ENVELOPE_VERSION: u16 = 1;

// =============================================================================
// CachePayload
// =============================================================================

/// An opaque cached value: a JSON field map plus named binary sections.
///
/// Pixel buffers and encoded images go in `blobs`; everything describable as
/// JSON (metadata dicts, flags, dimensions) goes in `fields`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CachePayload {
    pub fields: Map<String, Value>,
    pub blobs: BTreeMap<String, Bytes>,
}

impl CachePayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_blob(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.blobs.insert(name.into(), data.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn blob(&self, name: &str) -> Option<&Bytes> {
        self.blobs.get(name)
    }

    /// Serialize into the versioned blob envelope.
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let fields = serde_json::to_vec(&self.fields)
            .map_err(|e| EnvelopeError::InvalidFields(e.to_string()))?;
        let fields_len =
            u32::try_from(fields.len()).map_err(|_| EnvelopeError::TooLarge("fields"))?;
        let count =
            u16::try_from(self.blobs.len()).map_err(|_| EnvelopeError::TooLarge("section count"))?;

        let body: usize = self
            .blobs
            .iter()
            .map(|(name, data)| 2 + name.len() + 8 + data.len())
            .sum();
        let mut out = Vec::with_capacity(MAGIC.len() + 2 + 4 + fields.len() + 2 + body);

        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&ENVELOPE_VERSION.to_le_bytes());
        out.extend_from_slice(&fields_len.to_le_bytes());
        out.extend_from_slice(&fields);
        out.extend_from_slice(&count.to_le_bytes());

        for (name, data) in &self.blobs {
            let name_len =
                u16::try_from(name.len()).map_err(|_| EnvelopeError::TooLarge("section name"))?;
            out.extend_from_slice(&name_len.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(data);
        }

        Ok(out)
    }

    /// Parse a blob envelope. Section data is sliced out of `data` without copying.
    pub fn decode(data: Bytes) -> Result<Self, EnvelopeError> {
        let mut cursor = Cursor { data: &data, pos: 0 };

        if cursor.take(MAGIC.len())? != MAGIC {
            return Err(EnvelopeError::BadMagic);
        }
        let version = read_u16_le(cursor.take(2)?);
        if version != ENVELOPE_VERSION {
            return Err(EnvelopeError::UnsupportedVersion(version));
        }

        let fields_len = read_u32_le(cursor.take(4)?) as usize;
        let fields: Map<String, Value> = serde_json::from_slice(cursor.take(fields_len)?)
            .map_err(|e| EnvelopeError::InvalidFields(e.to_string()))?;

        let count = read_u16_le(cursor.take(2)?);
        let mut blobs = BTreeMap::new();
        for _ in 0..count {
            let name_len = read_u16_le(cursor.take(2)?) as usize;
            let name = std::str::from_utf8(cursor.take(name_len)?)
                .map_err(|_| EnvelopeError::InvalidName)?
                .to_string();
            let len = read_u64_le(cursor.take(8)?);
            let len = usize::try_from(len).map_err(|_| EnvelopeError::Truncated {
                needed: len,
                available: cursor.remaining() as u64,
            })?;
            let start = cursor.pos;
            cursor.take(len)?;
            blobs.insert(name, data.slice(start..start + len));
        }

        if cursor.remaining() != 0 {
            return Err(EnvelopeError::TrailingBytes(cursor.remaining()));
        }

        Ok(Self { fields, blobs })
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Reasons a blob envelope is rejected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("bad magic")]
    BadMagic,

    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u16),

    #[error("truncated: need {needed} bytes, {available} available")]
    Truncated { needed: u64, available: u64 },

    #[error("invalid field map: {0}")]
    InvalidFields(String),

    #[error("section name is not UTF-8")]
    InvalidName,

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),

    #[error("{0} exceeds envelope limits")]
    TooLarge(&'static str),
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], EnvelopeError> {
        if n > self.remaining() {
            return Err(EnvelopeError::Truncated {
                needed: n as u64,
                available: self.remaining() as u64,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }
}
