//! Memory Management Interfaces
//!
//! Addresses, page protection bits and the collaborator seams the shared
//! frame table is built on:
//!
//! - [`FrameAllocator`] hands out and takes back zero-filled physical frames
//! - [`PageMapper`] installs a frame into one process's page table
//!
//! Concrete implementations live in the submodules: [`allocator::FramePool`]
//! is a fixed pool of frames and [`virtual_memory::AddressSpace`] is a
//! software page table keyed by virtual page number.
//!
//! # Memory Layout
//!
//! ```text
//! Sv39 user address space (page granular):
//! 0x0000_0000 - 0x3F_FFFF_FFFF : user text, data, heap, shared frames
//! 0x40_0000_0000 and above     : trampoline / kernel (never mapped here)
//! ```

#![deny(missing_docs)]

use bitflags::bitflags;
use static_assertions::const_assert_eq;
use thiserror_no_std::Error;

pub mod allocator;
pub mod virtual_memory;

pub use allocator::FramePool;
pub use virtual_memory::AddressSpace;

/// Size of one physical frame / virtual page in bytes
pub const PAGE_SIZE: usize = 4096;

/// log2(PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;

const_assert_eq!(1 << PAGE_SHIFT, PAGE_SIZE);

/// Physical memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysicalAddress(usize);

impl PhysicalAddress {
    /// Create a new physical address
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Whether the address sits on a page boundary
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    /// Physical frame number
    pub const fn frame_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }
}

/// Virtual memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualAddress(usize);

impl VirtualAddress {
    /// Create a new virtual address
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Get the raw address value
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Whether the address sits on a page boundary
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }

    /// Virtual page number
    pub const fn page_number(self) -> usize {
        self.0 >> PAGE_SHIFT
    }

    /// Byte offset inside the page
    pub const fn page_offset(self) -> usize {
        self.0 & (PAGE_SIZE - 1)
    }
}

bitflags! {
    /// Page table entry permission bits (RISC-V Sv39 layout)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PageFlags: u32 {
        /// Entry is valid
        const VALID = 1 << 0;
        /// Page is readable
        const READ = 1 << 1;
        /// Page is writable
        const WRITE = 1 << 2;
        /// Page is executable
        const EXECUTE = 1 << 3;
        /// Page is accessible from user mode
        const USER = 1 << 4;
    }
}

/// Memory management errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// No page table slot or frame left
    #[error("out of memory")]
    OutOfMemory,
    /// Address outside the managed range
    #[error("invalid address {0:#x}")]
    InvalidAddress(usize),
    /// Address not aligned to a page boundary
    #[error("address {0:#x} is not page aligned")]
    AlignmentError(usize),
    /// Virtual page already has a mapping
    #[error("virtual address {0:#x} is already mapped")]
    AlreadyMapped(usize),
    /// Virtual page has no mapping
    #[error("virtual address {0:#x} is not mapped")]
    NotMapped(usize),
}

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// One physical frame, owned by whoever holds the value.
///
/// Frames are neither `Clone` nor `Copy`: a frame returned by
/// [`FrameAllocator::allocate_zeroed`] must travel back through
/// [`FrameAllocator::deallocate`] exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    address: PhysicalAddress,
}

impl Frame {
    /// Wrap a page-aligned physical address. Only frame allocators should
    /// call this.
    pub const fn new(address: PhysicalAddress) -> Self {
        Self { address }
    }

    /// Physical address of the first byte of the frame
    pub const fn address(&self) -> PhysicalAddress {
        self.address
    }
}

/// Source of physical frames (`kalloc` / `kfree`)
pub trait FrameAllocator {
    /// Hand out one page-sized, zero-filled frame, or `None` when exhausted.
    fn allocate_zeroed(&mut self) -> Option<Frame>;

    /// Take a frame back.
    fn deallocate(&mut self, frame: Frame);
}

/// Page table of one process (`mappages`)
pub trait PageMapper {
    /// Map the page at `va` to the frame at `pa` with `flags`.
    ///
    /// `VALID` is implied. Fails without side effects if `va` is already
    /// mapped or no page table space is left.
    fn map_page(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageFlags,
    ) -> MemoryResult<()>;

    /// Remove the mapping of the page at `va`, returning the frame it
    /// pointed at. Process teardown uses this for shared frames.
    fn unmap_page(&mut self, va: VirtualAddress) -> MemoryResult<PhysicalAddress>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_helpers() {
        let va = VirtualAddress::new(0x4000_1234);
        assert_eq!(va.page_number(), 0x4_0001);
        assert_eq!(va.page_offset(), 0x234);
        assert!(!va.is_page_aligned());
        assert!(PhysicalAddress::new(0x8000_0000).is_page_aligned());
        assert_eq!(PhysicalAddress::new(0x8000_2000).frame_number(), 0x8_0002);
    }

    #[test]
    fn shared_mapping_flags() {
        let flags = PageFlags::READ | PageFlags::WRITE | PageFlags::USER;
        assert!(!flags.contains(PageFlags::EXECUTE));
        assert_eq!(flags.bits(), 0b1_0110);
    }
}
