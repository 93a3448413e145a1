//! ID types for chunks and jobs.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global counter for chunk IDs.
static CHUNK_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Global counter for job IDs.
static JOB_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique handle for a loaded chunk.
///
/// Chunks refer to their neighbours by `ChunkId`, not by pointer; the store
/// resolves ids at use time so ownership never forms a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(u64);

impl ChunkId {
    /// Allocates the next unique chunk ID.
    #[must_use]
    pub fn next() -> Self {
        Self(CHUNK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a chunk ID from a raw value (for deserialization).
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Null/invalid chunk ID.
    pub const NULL: Self = Self(0);

    /// Checks if this is a valid (non-null) chunk ID.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Unique identifier for a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(u64);

impl JobId {
    /// Allocates the next unique job ID.
    #[must_use]
    pub fn next() -> Self {
        Self(JOB_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_ids_unique() {
        let a = ChunkId::next();
        let b = ChunkId::next();
        assert_ne!(a, b);
        assert!(a.is_valid());
        assert!(!ChunkId::NULL.is_valid());
    }

    #[test]
    fn test_job_ids_unique() {
        assert_ne!(JobId::next(), JobId::next());
    }
}
