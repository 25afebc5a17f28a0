//! Data segment access
//!
//! The heap asks the process for more memory through one primitive,
//! [`DataSegment::extend_break`] (`sbrk`), and reads and writes the segment
//! through byte views indexed by offset from the segment start.

use alloc::vec::Vec;

use log::debug;

use crate::config::DEFAULT_SEGMENT_LIMIT;
use crate::{HeapError, HeapResult};

/// A process data segment that grows at its high end
pub trait DataSegment {
    /// Move the break up by `increment` bytes and return the old break.
    ///
    /// New bytes are contiguous with the old ones. On failure nothing
    /// changes.
    fn extend_break(&mut self, increment: usize) -> HeapResult<usize>;

    /// Bytes from the segment start up to the current break
    fn memory(&self) -> &[u8];

    /// Mutable bytes from the segment start up to the current break
    fn memory_mut(&mut self) -> &mut [u8];
}

/// Heap-backed segment with a fixed growth limit, standing in for `sbrk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedSegment {
    bytes: Vec<u8>,
    limit: usize,
}

impl Default for BoundedSegment {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_LIMIT)
    }
}

impl BoundedSegment {
    /// Empty segment that refuses to grow past `limit` bytes
    pub const fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
        }
    }

    /// Growth limit in bytes
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Current break
    pub fn brk(&self) -> usize {
        self.bytes.len()
    }
}

impl DataSegment for BoundedSegment {
    fn extend_break(&mut self, increment: usize) -> HeapResult<usize> {
        let old = self.bytes.len();
        let new = old
            .checked_add(increment)
            .filter(|&new| new <= self.limit)
            .ok_or(HeapError::SegmentExhausted {
                requested: increment,
            })?;

        self.bytes.resize(new, 0);
        debug!("sbrk({increment}): break {old:#x} -> {new:#x}");
        Ok(old)
    }

    fn memory(&self) -> &[u8] {
        &self.bytes
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}
