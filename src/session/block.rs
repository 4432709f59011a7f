//! Drained entropy blocks.

use chrono::{DateTime, Utc};
use std::fmt;

/// A completed block of entropy bytes.
///
/// Not `Clone`: once drained from the collector a block has exactly one
/// owner, which is either the session queue or the delivery in flight.
pub struct Block {
    index: u32,
    bytes: Vec<u8>,
    chi_square: f64,
    created_at: DateTime<Utc>,
}

impl Block {
    /// Creates a block stamped with the current time.
    pub fn new(index: u32, bytes: Vec<u8>, chi_square: f64) -> Self {
        Self::with_timestamp(index, bytes, chi_square, Utc::now())
    }

    pub fn with_timestamp(
        index: u32,
        bytes: Vec<u8>,
        chi_square: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            bytes,
            chi_square,
            created_at,
        }
    }

    /// 1-based position of the block within its session.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Collector statistic recorded when the block was drained.
    #[inline]
    pub fn chi_square(&self) -> f64 {
        self.chi_square
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Artifact label, unique per `(index, unix seconds)`.
    pub fn label(&self, prefix: &str) -> BlockLabel {
        BlockLabel::new(prefix, self.index, self.created_at.timestamp())
    }

    /// Short BLAKE3 fingerprint for logs; never reveals the bytes.
    pub fn digest(&self) -> String {
        let hash = blake3::hash(&self.bytes);
        hash.to_hex().as_str()[..16].to_string()
    }

    /// Gives up the bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("index", &self.index)
            .field("len", &self.bytes.len())
            .field("chi_square", &self.chi_square)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Name shared by every artifact of one block, e.g. `OE_block3_1700000000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockLabel(String);

impl BlockLabel {
    pub fn new(prefix: &str, index: u32, unix_seconds: i64) -> Self {
        Self(format!("{prefix}{index}_{unix_seconds}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
