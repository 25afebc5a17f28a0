//! Software Address Space
//!
//! A per-process page table kept as a map from virtual page number to the
//! frame it points at. It implements [`PageMapper`] and gives the kernel (and
//! tests) translation and teardown without touching hardware tables.
//!
//! # Features
//!
//! - Page-granular mapping and unmapping
//! - Address translation with in-page offsets
//! - Bounded capacity, reported as `OutOfMemory` when exhausted

#![deny(missing_docs)]

use heapless::FnvIndexMap;

use super::{MemoryError, MemoryResult, PageFlags, PageMapper, PhysicalAddress, VirtualAddress};

/// Maximum number of pages mapped in one address space (power of two)
pub const MAX_MAPPINGS: usize = 64;

/// One installed page table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Frame the page points at
    pub frame: PhysicalAddress,
    /// Protection bits, `VALID` always set
    pub flags: PageFlags,
}

/// Address space statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpaceStats {
    /// Pages currently mapped
    pub mapped_pages: usize,
    /// Successful map operations
    pub maps: u64,
    /// Successful unmap operations
    pub unmaps: u64,
}

/// Address space for a process
#[derive(Debug, Default)]
pub struct AddressSpace {
    /// Page table entries keyed by virtual page number
    entries: FnvIndexMap<usize, Mapping, MAX_MAPPINGS>,
    /// Address space statistics
    stats: AddressSpaceStats,
}

impl AddressSpace {
    /// Create an empty address space
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate a virtual address, keeping the in-page offset
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.entries
            .get(&va.page_number())
            .map(|m| PhysicalAddress::new(m.frame.as_usize() + va.page_offset()))
    }

    /// Entry for the page containing `va`
    pub fn mapping(&self, va: VirtualAddress) -> Option<Mapping> {
        self.entries.get(&va.page_number()).copied()
    }

    /// Snapshot of the address space statistics
    pub const fn stats(&self) -> AddressSpaceStats {
        self.stats
    }
}

impl PageMapper for AddressSpace {
    fn map_page(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageFlags,
    ) -> MemoryResult<()> {
        if !va.is_page_aligned() {
            return Err(MemoryError::AlignmentError(va.as_usize()));
        }
        if !pa.is_page_aligned() {
            return Err(MemoryError::AlignmentError(pa.as_usize()));
        }

        let vpn = va.page_number();
        if self.entries.contains_key(&vpn) {
            return Err(MemoryError::AlreadyMapped(va.as_usize()));
        }

        let mapping = Mapping {
            frame: pa,
            flags: flags | PageFlags::VALID,
        };
        self.entries
            .insert(vpn, mapping)
            .map_err(|_| MemoryError::OutOfMemory)?;

        self.stats.mapped_pages += 1;
        self.stats.maps += 1;
        Ok(())
    }

    fn unmap_page(&mut self, va: VirtualAddress) -> MemoryResult<PhysicalAddress> {
        let mapping = self
            .entries
            .remove(&va.page_number())
            .ok_or(MemoryError::NotMapped(va.as_usize()))?;

        self.stats.mapped_pages -= 1;
        self.stats.unmaps += 1;
        Ok(mapping.frame)
    }
}
