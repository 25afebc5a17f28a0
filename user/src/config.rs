//! Heap layout constants and runtime configuration

use static_assertions::{const_assert, const_assert_eq};

use crate::{HeapError, HeapResult};

/// Size of a boundary tag word in bytes
pub const WORD_SIZE: usize = 4;

/// Payload alignment; every block size is a multiple of it
pub const ALIGNMENT: usize = 8;

/// Header plus footer
pub const TAG_OVERHEAD: usize = 2 * WORD_SIZE;

/// Smallest block: tags plus one aligned payload unit
pub const MIN_BLOCK_SIZE: usize = 2 * ALIGNMENT;

/// Default arena growth step
pub const CHUNK_SIZE: usize = 1 << 12;

/// Bytes taken at init for the pad word, the prologue block and the
/// epilogue header
pub const SENTINEL_BYTES: usize = 4 * WORD_SIZE;

/// Largest arena a 32-bit tag can describe
pub const MAX_ARENA_BYTES: usize = (u32::MAX as usize) & !(ALIGNMENT - 1);

/// Default growth limit of a [`crate::BoundedSegment`]
pub const DEFAULT_SEGMENT_LIMIT: usize = 16 * 1024 * 1024;

const_assert!(ALIGNMENT.is_power_of_two());
const_assert_eq!(TAG_OVERHEAD, ALIGNMENT);
const_assert_eq!(SENTINEL_BYTES % ALIGNMENT, 0);
const_assert_eq!(CHUNK_SIZE % ALIGNMENT, 0);

/// Runtime heap configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
    /// Minimum number of bytes requested from the segment when the arena
    /// has no fit
    pub chunk_size: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl HeapConfig {
    /// Configuration with the default chunk size
    pub const fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Replace the growth chunk
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Check the configuration before a heap is built on it
    pub const fn validate(&self) -> HeapResult<()> {
        if self.chunk_size < MIN_BLOCK_SIZE {
            return Err(HeapError::InvalidConfig(
                "chunk size below the minimum block size",
            ));
        }
        if self.chunk_size % ALIGNMENT != 0 {
            return Err(HeapError::InvalidConfig(
                "chunk size is not a multiple of the alignment",
            ));
        }
        Ok(())
    }
}

/// Block size needed for a `size`-byte payload, or `None` on overflow
pub(crate) const fn block_size_for(size: usize) -> Option<usize> {
    if size <= ALIGNMENT {
        return Some(MIN_BLOCK_SIZE);
    }
    match size.checked_add(TAG_OVERHEAD + ALIGNMENT - 1) {
        Some(padded) => Some(padded / ALIGNMENT * ALIGNMENT),
        None => None,
    }
}
