//! Shared Frame Table
//!
//! Lets unrelated address spaces map the same physical page. A process asks
//! for a shared frame (`create`), gets back a small integer handle, and any
//! process that knows the handle can map the frame into its own address space
//! (`attach`). The frame stays alive while at least one attachment is
//! outstanding and is released on the `detach` that drops the count to zero.
//!
//! # Design Principles
//!
//! - **Fixed capacity**: `MAX_SHM` slots, no allocation on the table path
//! - **One lock**: every operation runs entirely under the table lock, so
//!   operations are totally ordered and no partial slot is ever observed
//! - **Ownership**: the table owns the frame; processes only hold mappings
//! - **Atomic failure**: an operation that fails has changed nothing
//!
//! # Slot Lifecycle
//!
//! ```text
//! Free --create--> Live(count 0) --attach--> Live(count n+1)
//!   ^                                              |
//!   +---------- detach, count reaches 0 -----------+
//! ```
//!
//! # Teardown Contract
//!
//! `detach` does not unmap the frame from any page table. Whoever tears a
//! process down must unmap its shared pages (see
//! [`crate::memory::PageMapper::unmap_page`]) before or while detaching,
//! otherwise the process keeps a mapping to a frame that may be reused.

#![deny(missing_docs)]

use bitflags::bitflags;
use thiserror_no_std::Error;

use crate::memory::MemoryError;

// Submodules
pub mod table;

// Re-exports
pub use table::{SHM_TABLE, ShmStats, ShmTable};

/// Number of slots in the shared-frame table
pub const MAX_SHM: usize = 16;

/// Shared frame handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShmId(u32);

impl ShmId {
    /// Create a new shared frame handle
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw handle value
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Slot index this handle names
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// Access permissions recorded on a shared frame.
    ///
    /// The table stores and returns the value; it does not enforce it.
    /// Bits outside the named flags are kept as given.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShmPermissions: u32 {
        /// Readers allowed
        const READ = 1 << 0;
        /// Writers allowed
        const WRITE = 1 << 1;
        /// Execution allowed
        const EXECUTE = 1 << 2;
    }
}

/// Shared frame table errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShmError {
    /// Every slot is live
    #[error("shared frame table is full")]
    TableFull,
    /// The frame allocator had nothing left
    #[error("no physical frame available")]
    OutOfFrames,
    /// Handle out of range or naming a free slot
    #[error("invalid shared frame handle")]
    InvalidHandle,
    /// The attachment count would overflow
    #[error("too many attachments")]
    AttachLimit,
    /// The page mapper refused the mapping
    #[error("mapping the shared frame failed: {0}")]
    MapFailed(MemoryError),
}

/// Result type for shared frame operations
pub type ShmResult<T> = Result<T, ShmError>;
