//! Shared Frame Table Implementation
//!
//! The table is an array of slots behind one `spin::Mutex`. Every public
//! operation takes the lock once, does at most O(`N`) work on the slot array
//! and releases the lock when the guard goes out of scope, including on the
//! early error returns. The frame allocator is called with the lock held;
//! it must not call back into the table.

#![deny(missing_docs)]

use core::mem;

use spin::Mutex;

use super::{MAX_SHM, ShmError, ShmId, ShmPermissions, ShmResult};
use crate::debug_print;
use crate::memory::{Frame, FrameAllocator, PageFlags, PageMapper, PhysicalAddress, VirtualAddress};

/// Protection installed for every shared frame mapping
const SHARED_PAGE_FLAGS: PageFlags = PageFlags::READ
    .union(PageFlags::WRITE)
    .union(PageFlags::USER);

/// The system-wide shared frame table
pub static SHM_TABLE: ShmTable = ShmTable::new();

/// A live shared frame
#[derive(Debug)]
struct SharedFrame {
    /// The frame, owned by the table
    frame: Frame,
    /// Outstanding attachments
    ref_count: u32,
    /// Recorded access permissions
    permissions: ShmPermissions,
}

/// One table entry
#[derive(Debug)]
enum Slot {
    /// Handle available for `create`
    Free,
    /// Handle in use
    Live(SharedFrame),
}

/// Table occupancy snapshot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShmStats {
    /// Total slots
    pub capacity: usize,
    /// Live slots
    pub live: usize,
    /// Sum of the attachment counts of all live slots
    pub attachments: u64,
}

/// Fixed-capacity table of reference-counted shared frames
#[derive(Debug)]
pub struct ShmTable<const N: usize = MAX_SHM> {
    slots: Mutex<[Slot; N]>,
}

impl<const N: usize> Default for ShmTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ShmTable<N> {
    /// Create a table with every slot free
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new([const { Slot::Free }; N]),
        }
    }

    /// Number of slots
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Claim the first free slot and back it with a fresh zeroed frame.
    ///
    /// The new slot starts with no attachments and empty permissions.
    pub fn create<A>(&self, frames: &mut A) -> ShmResult<ShmId>
    where
        A: FrameAllocator + ?Sized,
    {
        let mut slots = self.slots.lock();

        let Some((index, slot)) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| matches!(slot, Slot::Free))
        else {
            debug_print!(WARN, "shm: table full ({} slots)", N);
            return Err(ShmError::TableFull);
        };

        let frame = frames.allocate_zeroed().ok_or(ShmError::OutOfFrames)?;
        debug_print!(
            DEBUG,
            "shm {}: created on frame {:#x}",
            index,
            frame.address().as_usize()
        );

        *slot = Slot::Live(SharedFrame {
            frame,
            ref_count: 0,
            permissions: ShmPermissions::empty(),
        });

        Ok(ShmId::new(index as u32))
    }

    /// Map the frame behind `id` at `va` in `space` and count the attachment.
    ///
    /// The mapping is read-write and user accessible. If the mapper refuses,
    /// the count is left as it was.
    pub fn attach<M>(&self, id: ShmId, va: VirtualAddress, space: &mut M) -> ShmResult<()>
    where
        M: PageMapper + ?Sized,
    {
        let mut slots = self.slots.lock();
        let shared = live_mut(&mut *slots, id)?;

        let ref_count = shared.ref_count.checked_add(1).ok_or(ShmError::AttachLimit)?;
        space
            .map_page(va, shared.frame.address(), SHARED_PAGE_FLAGS)
            .map_err(ShmError::MapFailed)?;
        shared.ref_count = ref_count;

        debug_print!(
            TRACE,
            "shm {}: attached at {:#x}, {} attachments",
            id.as_u32(),
            va.as_usize(),
            ref_count
        );
        Ok(())
    }

    /// Drop one attachment of `id`; the last one frees the frame and the slot.
    ///
    /// Detaching a slot that was created but never attached releases it too.
    /// No page table is touched here, see the module-level teardown contract.
    pub fn detach<A>(&self, id: ShmId, frames: &mut A) -> ShmResult<()>
    where
        A: FrameAllocator + ?Sized,
    {
        let mut slots = self.slots.lock();
        let slot = slots.get_mut(id.index()).ok_or(ShmError::InvalidHandle)?;

        let remaining = match slot {
            Slot::Live(shared) => {
                shared.ref_count = shared.ref_count.saturating_sub(1);
                shared.ref_count
            }
            Slot::Free => return Err(ShmError::InvalidHandle),
        };

        if remaining == 0 {
            if let Slot::Live(shared) = mem::replace(slot, Slot::Free) {
                debug_print!(
                    DEBUG,
                    "shm {}: last detach, releasing frame {:#x}",
                    id.as_u32(),
                    shared.frame.address().as_usize()
                );
                frames.deallocate(shared.frame);
            }
        }
        Ok(())
    }

    /// Permissions recorded on `id`
    pub fn permission(&self, id: ShmId) -> ShmResult<ShmPermissions> {
        let mut slots = self.slots.lock();
        live_mut(&mut *slots, id).map(|shared| shared.permissions)
    }

    /// Record new permissions on `id`
    pub fn set_permission(&self, id: ShmId, permissions: ShmPermissions) -> ShmResult<()> {
        let mut slots = self.slots.lock();
        live_mut(&mut *slots, id)?.permissions = permissions;
        Ok(())
    }

    /// Attachment count of `id`
    pub fn ref_count(&self, id: ShmId) -> ShmResult<u32> {
        let mut slots = self.slots.lock();
        live_mut(&mut *slots, id).map(|shared| shared.ref_count)
    }

    /// Physical address of the frame behind `id`
    pub fn frame_address(&self, id: ShmId) -> ShmResult<PhysicalAddress> {
        let mut slots = self.slots.lock();
        live_mut(&mut *slots, id).map(|shared| shared.frame.address())
    }

    /// Occupancy snapshot taken under the lock
    pub fn stats(&self) -> ShmStats {
        let slots = self.slots.lock();
        slots.iter().fold(
            ShmStats {
                capacity: N,
                ..ShmStats::default()
            },
            |mut stats, slot| {
                if let Slot::Live(shared) = slot {
                    stats.live += 1;
                    stats.attachments += u64::from(shared.ref_count);
                }
                stats
            },
        )
    }
}

/// Live slot named by `id`; out of range and free slots look the same
fn live_mut(slots: &mut [Slot], id: ShmId) -> ShmResult<&mut SharedFrame> {
    match slots.get_mut(id.index()) {
        Some(Slot::Live(shared)) => Ok(shared),
        _ => Err(ShmError::InvalidHandle),
    }
}
