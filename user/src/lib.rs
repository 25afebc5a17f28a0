//! Frameshare User Heap
//!
//! `malloc` / `free` / `realloc` for a user process, managing one contiguous
//! arena carved out of the process's data segment.
//!
//! # Algorithm
//!
//! The arena is an implicit free list with boundary tags: every block starts
//! with a header word and ends with a footer word, each holding the block
//! size with the allocated flag in bit 0. The footer lets `free` look at the
//! previous block in O(1), so free blocks are merged with both neighbours the
//! moment they are released.
//!
//! - Allocation: first fit from the low end, splitting the block found
//! - Growth: `max(request, chunk)` bytes appended at the break on a miss
//! - Resize: shrink in place, grow into a free successor, or move
//!
//! # Addressing
//!
//! Blocks are addressed by byte offset into the segment. A [`Payload`] is
//! the offset of the first payload byte and plays the role of the pointer
//! `malloc` would return; [`Heap::payload`] and [`Heap::payload_mut`] give
//! the bytes behind it.
//!
//! # Concurrency
//!
//! None. A [`Heap`] belongs to one thread of one process; every operation
//! takes `&mut self`.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
#![warn(clippy::panic)]
#![warn(clippy::unwrap_used)]

extern crate alloc;

use thiserror_no_std::Error;

pub mod config;
pub mod heap;
pub mod segment;
pub mod tag;

pub use config::{ALIGNMENT, CHUNK_SIZE, HeapConfig, MIN_BLOCK_SIZE, WORD_SIZE};
pub use heap::{BlockInfo, Blocks, Heap, HeapStats, Payload};
pub use segment::{BoundedSegment, DataSegment};
pub use tag::BoundaryTag;

/// Heap errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HeapError {
    /// The data segment cannot grow by the requested amount
    #[error("data segment exhausted: cannot grow by {requested} bytes")]
    SegmentExhausted {
        /// Bytes asked for
        requested: usize,
    },
    /// The segment break is not aligned for payloads
    #[error("data segment break {base:#x} is not payload aligned")]
    MisalignedSegment {
        /// Break at initialisation
        base: usize,
    },
    /// Configuration rejected
    #[error("invalid heap configuration: {0}")]
    InvalidConfig(&'static str),
    /// Block metadata is inconsistent
    #[error("heap corrupted at offset {offset:#x}")]
    Corrupted {
        /// Payload offset of the first bad block
        offset: usize,
    },
}

/// Result type for heap operations
pub type HeapResult<T> = Result<T, HeapError>;
