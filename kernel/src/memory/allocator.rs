//! Physical Frame Pool
//!
//! A fixed pool of `N` page frames laid out contiguously from a physical base
//! address. Free frames are kept on a LIFO stack, so the most recently freed
//! frame is handed out next.
//!
//! The backing bytes are owned by the pool, so frame contents can be read and
//! written through [`FramePool::frame_bytes`] without raw pointers. This is
//! the kernel's boot-time frame source and the frame allocator used by the
//! shared-frame table tests.
//!
//! # Time Complexity
//!
//! - Allocation: O(1) plus the zero fill
//! - Deallocation: O(1)

#![deny(missing_docs)]

use alloc::boxed::Box;
use alloc::vec;
use heapless::Vec;

use super::{Frame, FrameAllocator, MemoryError, MemoryResult, PAGE_SIZE, PhysicalAddress};
use crate::debug_print;

/// Frame pool statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Frames managed by the pool
    pub total_frames: usize,
    /// Frames currently handed out
    pub allocated_frames: usize,
    /// Successful allocations since creation
    pub total_allocations: u64,
    /// Deallocations since creation
    pub total_deallocations: u64,
    /// Allocation requests refused because the pool was empty
    pub failed_allocations: u64,
}

/// Pool of `N` physical frames
pub struct FramePool<const N: usize> {
    /// Physical address of frame 0
    base: PhysicalAddress,
    /// Frame contents, one page per frame
    pages: Box<[[u8; PAGE_SIZE]]>,
    /// Indices of free frames, top of stack is handed out next
    free: Vec<usize, N>,
    /// Allocation state per frame
    in_use: [bool; N],
    /// Allocation statistics
    stats: PoolStats,
}

impl<const N: usize> FramePool<N> {
    /// Create a pool whose first frame lives at `base`.
    pub fn new(base: PhysicalAddress) -> MemoryResult<Self> {
        if !base.is_page_aligned() {
            return Err(MemoryError::AlignmentError(base.as_usize()));
        }
        base.as_usize()
            .checked_add(N * PAGE_SIZE)
            .ok_or(MemoryError::InvalidAddress(base.as_usize()))?;

        let mut free = Vec::new();
        // Lowest frame on top so allocation order follows address order
        for index in (0..N).rev() {
            free.push(index).map_err(|_| MemoryError::OutOfMemory)?;
        }

        debug_print!(DEBUG, "frame pool: {} frames at {:#x}", N, base.as_usize());

        Ok(Self {
            base,
            pages: vec![[0u8; PAGE_SIZE]; N].into_boxed_slice(),
            free,
            in_use: [false; N],
            stats: PoolStats {
                total_frames: N,
                ..PoolStats::default()
            },
        })
    }

    /// Number of frames that can still be allocated
    pub fn free_frames(&self) -> usize {
        self.free.len()
    }

    /// Snapshot of the pool statistics
    pub const fn stats(&self) -> PoolStats {
        self.stats
    }

    /// Contents of an allocated frame
    pub fn frame_bytes(&self, address: PhysicalAddress) -> Option<&[u8]> {
        let index = self.allocated_index(address)?;
        self.pages.get(index).map(|page| page.as_slice())
    }

    /// Mutable contents of an allocated frame
    pub fn frame_bytes_mut(&mut self, address: PhysicalAddress) -> Option<&mut [u8]> {
        let index = self.allocated_index(address)?;
        self.pages.get_mut(index).map(|page| page.as_mut_slice())
    }

    /// Frame index for `address` if it names an allocated frame of this pool
    fn allocated_index(&self, address: PhysicalAddress) -> Option<usize> {
        let index = self.index_of(address)?;
        self.in_use.get(index).copied().unwrap_or(false).then_some(index)
    }

    fn index_of(&self, address: PhysicalAddress) -> Option<usize> {
        if !address.is_page_aligned() {
            return None;
        }
        let offset = address.as_usize().checked_sub(self.base.as_usize())?;
        let index = offset / PAGE_SIZE;
        (index < N).then_some(index)
    }
}

impl<const N: usize> FrameAllocator for FramePool<N> {
    fn allocate_zeroed(&mut self) -> Option<Frame> {
        let Some(index) = self.free.pop() else {
            self.stats.failed_allocations += 1;
            debug_print!(WARN, "frame pool exhausted ({} frames)", N);
            return None;
        };

        if let Some(page) = self.pages.get_mut(index) {
            page.fill(0);
        }
        if let Some(flag) = self.in_use.get_mut(index) {
            *flag = true;
        }

        self.stats.allocated_frames += 1;
        self.stats.total_allocations += 1;

        let address = PhysicalAddress::new(self.base.as_usize() + index * PAGE_SIZE);
        debug_print!(TRACE, "frame {:#x} allocated", address.as_usize());
        Some(Frame::new(address))
    }

    fn deallocate(&mut self, frame: Frame) {
        let address = frame.address();
        let Some(index) = self.allocated_index(address) else {
            debug_print!(
                ERROR,
                "frame {:#x} is not an allocated frame of this pool",
                address.as_usize()
            );
            return;
        };

        if let Some(flag) = self.in_use.get_mut(index) {
            *flag = false;
        }
        if self.free.push(index).is_err() {
            debug_print!(
                ERROR,
                "frame {:#x} lost: free list already holds {} frames",
                address.as_usize(),
                N
            );
            return;
        }

        self.stats.allocated_frames -= 1;
        self.stats.total_deallocations += 1;
        debug_print!(TRACE, "frame {:#x} released", address.as_usize());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: PhysicalAddress = PhysicalAddress::new(0x8010_0000);

    #[test]
    fn rejects_unaligned_base() {
        assert_eq!(
            FramePool::<4>::new(PhysicalAddress::new(0x8010_0010)).err(),
            Some(MemoryError::AlignmentError(0x8010_0010))
        );
    }

    #[test]
    fn hands_out_frames_in_address_order_until_empty() {
        let mut pool = FramePool::<2>::new(BASE).unwrap();
        let a = pool.allocate_zeroed().unwrap();
        let b = pool.allocate_zeroed().unwrap();
        assert_eq!(a.address(), BASE);
        assert_eq!(b.address().as_usize(), BASE.as_usize() + PAGE_SIZE);
        assert!(pool.allocate_zeroed().is_none());
        assert_eq!(pool.stats().failed_allocations, 1);
        assert_eq!(pool.stats().allocated_frames, 2);
    }

    #[test]
    fn recycled_frames_come_back_zeroed() {
        let mut pool = FramePool::<1>::new(BASE).unwrap();
        let frame = pool.allocate_zeroed().unwrap();
        pool.frame_bytes_mut(frame.address()).unwrap().fill(0xAB);
        let address = frame.address();
        pool.deallocate(frame);
        assert!(pool.frame_bytes(address).is_none());

        let again = pool.allocate_zeroed().unwrap();
        assert_eq!(again.address(), address);
        assert!(pool.frame_bytes(address).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn foreign_frames_are_ignored() {
        let mut pool = FramePool::<1>::new(BASE).unwrap();
        pool.deallocate(Frame::new(PhysicalAddress::new(0x1000)));
        assert_eq!(pool.free_frames(), 1);
        assert_eq!(pool.stats().total_deallocations, 0);
    }

    #[test]
    fn forged_double_free_keeps_the_free_list_bounded() {
        let mut pool = FramePool::<2>::new(BASE).unwrap();
        let frame = pool.allocate_zeroed().unwrap();
        let address = frame.address();
        pool.deallocate(frame);
        pool.deallocate(Frame::new(address));

        assert_eq!(pool.free_frames(), 2);
        assert_eq!(pool.stats().total_deallocations, 1);
        assert_eq!(pool.stats().allocated_frames, 0);
    }
}
