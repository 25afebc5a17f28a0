//! Boundary-tag heap
//!
//! # Arena Layout
//!
//! ```text
//! base
//!  | pad | hdr 8/1 | ftr 8/1 | hdr | payload ... | ftr | ... | hdr 0/1 |
//!        '--- prologue ----'  '------- block -------'        epilogue
//! ```
//!
//! Offsets handed around internally are payload offsets (`bp`): the header
//! of a block sits at `bp - WORD_SIZE`, its footer at `bp + size - 8`, the
//! next block's payload at `bp + size` and the previous block's footer at
//! `bp - 8`. The prologue and epilogue are allocated, so the merge logic
//! never walks off either end of the arena.
//!
//! Every tag read and write is bounds checked against the segment. A tag
//! that points outside the arena surfaces as [`HeapError::Corrupted`].

use core::cmp::Ordering;

use log::{trace, warn};

use crate::config::{
    ALIGNMENT, HeapConfig, MAX_ARENA_BYTES, MIN_BLOCK_SIZE, SENTINEL_BYTES, TAG_OVERHEAD,
    WORD_SIZE, block_size_for,
};
use crate::segment::DataSegment;
use crate::tag::BoundaryTag;
use crate::{HeapError, HeapResult};

/// Tag of the prologue block
const PROLOGUE: BoundaryTag = BoundaryTag::new(ALIGNMENT as u32, true);

/// Tag of the epilogue header
const EPILOGUE: BoundaryTag = BoundaryTag::new(0, true);

/// Handle to an allocated payload: its byte offset in the data segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Payload(usize);

impl Payload {
    /// Offset of the first payload byte from the segment start
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// One block as seen by a walk over the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Payload offset
    pub payload: Payload,
    /// Block size, tags included
    pub size: usize,
    /// Allocation state
    pub allocated: bool,
}

impl BlockInfo {
    /// Usable payload bytes
    pub const fn capacity(&self) -> usize {
        self.size - TAG_OVERHEAD
    }
}

/// Arena usage summary
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// Bytes taken from the data segment, sentinels included
    pub arena_bytes: usize,
    /// Bytes in free blocks, tags included
    pub free_bytes: usize,
    /// Bytes in allocated blocks, tags included
    pub allocated_bytes: usize,
    /// Number of free blocks
    pub free_blocks: usize,
    /// Number of allocated blocks
    pub allocated_blocks: usize,
    /// Largest free block
    pub largest_free: usize,
}

/// Implicit free list allocator over a [`DataSegment`]
#[derive(Debug)]
pub struct Heap<S: DataSegment> {
    segment: S,
    config: HeapConfig,
    /// Segment offset of the pad word
    base: usize,
    /// Payload offset of the prologue block
    prologue: usize,
}

impl<S: DataSegment> Heap<S> {
    /// Lay out the sentinels and one chunk of free space at the current
    /// break of `segment`
    pub fn init(segment: S) -> HeapResult<Self> {
        Self::with_config(segment, HeapConfig::default())
    }

    /// [`Heap::init`] with an explicit configuration
    pub fn with_config(mut segment: S, config: HeapConfig) -> HeapResult<Self> {
        config.validate()?;

        let brk = segment.memory().len();
        if brk % ALIGNMENT != 0 {
            return Err(HeapError::MisalignedSegment { base: brk });
        }

        let base = segment.extend_break(SENTINEL_BYTES)?;
        let prologue = base + 2 * WORD_SIZE;
        let mut heap = Self {
            segment,
            config,
            base,
            prologue,
        };

        heap.put_tag(base, BoundaryTag::decode(0))?;
        heap.write_block(prologue, ALIGNMENT, true)?;
        heap.put_tag(base + 3 * WORD_SIZE, EPILOGUE)?;

        heap.extend(config.chunk_size)?;
        trace!("heap: initialised at {base:#x}, chunk {}", config.chunk_size);
        Ok(heap)
    }

    /// Allocate `size` bytes; `None` for a zero-size request or when the
    /// segment cannot grow
    pub fn allocate(&mut self, size: usize) -> Option<Payload> {
        if size == 0 {
            return None;
        }
        let asize = block_size_for(size)?;

        let bp = self
            .claim(asize)
            .map_err(|err| warn!("heap: allocate({size}) failed: {err}"))
            .ok()?;

        trace!("heap: allocate({size}) -> {bp:#x} [{asize}]");
        Some(Payload(bp))
    }

    /// Release a payload and merge it with free neighbours.
    ///
    /// Invalid and double frees are detected on a best-effort basis and
    /// ignored: an offset whose header and footer do not describe an
    /// allocated block is rejected, but a stale offset that happens to land
    /// on bytes shaped like a valid tag pair is not caught.
    pub fn free(&mut self, payload: Payload) {
        let bp = payload.0;
        let Some(size) = self.allocated_block_size(bp) else {
            warn!("heap: free({bp:#x}) is not an allocated block, ignored");
            return;
        };

        match self.release(bp, size) {
            Ok(merged) => trace!("heap: free({bp:#x}) -> free block {merged:#x}"),
            Err(err) => warn!("heap: free({bp:#x}) failed: {err}"),
        }
    }

    /// `realloc`: `None` payload allocates, size zero frees, otherwise the
    /// block is shrunk in place, grown into its free successor, or moved.
    ///
    /// On failure the original block is left untouched and `None` returned.
    pub fn resize(&mut self, payload: Option<Payload>, size: usize) -> Option<Payload> {
        let Some(payload) = payload else {
            return self.allocate(size);
        };
        if size == 0 {
            self.free(payload);
            return None;
        }

        let bp = payload.0;
        let Some(current) = self.allocated_block_size(bp) else {
            warn!("heap: resize({bp:#x}) is not an allocated block");
            return None;
        };
        let asize = block_size_for(size)?;

        let resized = match asize.cmp(&current) {
            Ordering::Equal => Ok(bp),
            Ordering::Less => self.split_in_place(bp, asize).map(|()| bp),
            Ordering::Greater => self.grow_block(bp, current, asize),
        };
        resized
            .map(Payload)
            .map_err(|err| warn!("heap: resize({bp:#x}, {size}) failed: {err}"))
            .ok()
    }

    /// Payload bytes of a live allocation
    pub fn payload(&self, payload: Payload) -> Option<&[u8]> {
        let size = self.allocated_block_size(payload.0)?;
        self.segment
            .memory()
            .get(payload.0..payload.0 + size - TAG_OVERHEAD)
    }

    /// Mutable payload bytes of a live allocation
    pub fn payload_mut(&mut self, payload: Payload) -> Option<&mut [u8]> {
        let size = self.allocated_block_size(payload.0)?;
        self.segment
            .memory_mut()
            .get_mut(payload.0..payload.0 + size - TAG_OVERHEAD)
    }

    /// Usable bytes of a live allocation
    pub fn capacity(&self, payload: Payload) -> Option<usize> {
        self.allocated_block_size(payload.0)
            .map(|size| size - TAG_OVERHEAD)
    }

    /// Blocks between the prologue and the epilogue, in address order.
    ///
    /// The walk stops early at a tag outside the arena; [`Heap::check`]
    /// reports that case.
    pub fn blocks(&self) -> Blocks<'_, S> {
        Blocks {
            heap: self,
            next: self.prologue + ALIGNMENT,
        }
    }

    /// Usage summary from one walk over the arena
    pub fn stats(&self) -> HeapStats {
        let init = HeapStats {
            arena_bytes: self.segment.memory().len() - self.base,
            ..HeapStats::default()
        };
        self.blocks().fold(init, |mut stats, block| {
            if block.allocated {
                stats.allocated_blocks += 1;
                stats.allocated_bytes += block.size;
            } else {
                stats.free_blocks += 1;
                stats.free_bytes += block.size;
                stats.largest_free = stats.largest_free.max(block.size);
            }
            stats
        })
    }

    /// Walk the arena and verify every block invariant: sentinels in place,
    /// header equal to footer, aligned payloads, no two free neighbours and
    /// blocks tiling the arena up to the epilogue.
    pub fn check(&self) -> HeapResult<()> {
        let end = self.segment.memory().len();
        let corrupted = |offset| Err(HeapError::Corrupted { offset });

        if self.tag_at(Self::header(self.prologue))? != PROLOGUE
            || self.tag_at(self.prologue)? != PROLOGUE
        {
            return corrupted(self.prologue);
        }

        let mut bp = self.prologue + ALIGNMENT;
        let mut previous_free = false;
        loop {
            if bp > end {
                return corrupted(bp);
            }
            let header = self.tag_at(Self::header(bp))?;
            if header.size() == 0 {
                return if header == EPILOGUE && bp == end {
                    Ok(())
                } else {
                    corrupted(bp)
                };
            }

            let size = header.size();
            if bp % ALIGNMENT != 0 || size < MIN_BLOCK_SIZE || bp + size > end {
                return corrupted(bp);
            }
            if self.tag_at(bp + size - TAG_OVERHEAD)? != header {
                return corrupted(bp);
            }
            if previous_free && !header.is_allocated() {
                return corrupted(bp);
            }

            previous_free = !header.is_allocated();
            bp += size;
        }
    }

    /// Configuration in use
    pub const fn config(&self) -> HeapConfig {
        self.config
    }

    /// The underlying data segment
    pub const fn segment(&self) -> &S {
        &self.segment
    }

    /// First free block of at least `asize` bytes
    fn find_fit(&self, asize: usize) -> Option<usize> {
        self.blocks()
            .find(|block| !block.allocated && block.size >= asize)
            .map(|block| block.payload.0)
    }

    /// Find or make room for an `asize`-byte block and mark it allocated
    fn claim(&mut self, asize: usize) -> HeapResult<usize> {
        let bp = match self.find_fit(asize) {
            Some(bp) => bp,
            None => self.extend(asize.max(self.config.chunk_size))?,
        };
        self.place(bp, asize)?;
        Ok(bp)
    }

    /// Append `bytes` (rounded up to the alignment) of free space at the
    /// break, replacing the old epilogue. Returns the free block that now
    /// ends at the epilogue.
    fn extend(&mut self, bytes: usize) -> HeapResult<usize> {
        let exhausted = HeapError::SegmentExhausted { requested: bytes };
        let size = bytes.checked_next_multiple_of(ALIGNMENT).ok_or(exhausted)?;
        let end = self.segment.memory().len();
        if (end - self.base)
            .checked_add(size)
            .map_or(true, |total| total > MAX_ARENA_BYTES)
        {
            return Err(exhausted);
        }
        if self.tag_at(end - WORD_SIZE)? != EPILOGUE {
            return Err(HeapError::Corrupted { offset: end });
        }

        let bp = self.segment.extend_break(size)?;
        self.write_block(bp, size, false)?;
        self.put_tag(Self::header(bp + size), EPILOGUE)?;
        self.coalesce(bp)
    }

    /// Mark `asize` bytes of the free-or-owned block at `bp` allocated,
    /// splitting off the rest when it can hold a block of its own.
    /// Returns the split-off free block.
    fn place(&mut self, bp: usize, asize: usize) -> HeapResult<Option<usize>> {
        let size = self.block_size(bp)?;
        match size.checked_sub(asize) {
            Some(rest_size) if rest_size >= MIN_BLOCK_SIZE => {
                self.write_block(bp, asize, true)?;
                let rest = bp + asize;
                self.write_block(rest, rest_size, false)?;
                Ok(Some(rest))
            }
            Some(_) => {
                self.write_block(bp, size, true)?;
                Ok(None)
            }
            None => Err(HeapError::Corrupted { offset: bp }),
        }
    }

    /// `place` on a block that may have a free successor
    fn split_in_place(&mut self, bp: usize, asize: usize) -> HeapResult<()> {
        if let Some(rest) = self.place(bp, asize)? {
            self.coalesce(rest)?;
        }
        Ok(())
    }

    /// Grow the allocated block at `bp` in place, or move it
    fn grow_block(&mut self, bp: usize, current: usize, asize: usize) -> HeapResult<usize> {
        if self.grow_in_place(bp, current, asize)? {
            return Ok(bp);
        }
        self.relocate(bp, current, asize)
    }

    fn grow_in_place(&mut self, bp: usize, current: usize, asize: usize) -> HeapResult<bool> {
        let next = self.tag_at(Self::header(bp + current))?;
        let combined = current + next.size();
        if next.is_allocated() || combined < asize {
            return Ok(false);
        }

        self.write_block(bp, combined, true)?;
        self.split_in_place(bp, asize)?;
        trace!("heap: grew {bp:#x} in place to {asize}");
        Ok(true)
    }

    fn relocate(&mut self, bp: usize, current: usize, asize: usize) -> HeapResult<usize> {
        let target = self.claim(asize)?;
        self.copy_payload(bp, target, current - TAG_OVERHEAD)?;
        self.release(bp, current)?;

        trace!("heap: moved {bp:#x} to {target:#x} [{asize}]");
        Ok(target)
    }

    /// Copy `len` payload bytes from `from` to `to` inside the segment
    fn copy_payload(&mut self, from: usize, to: usize, len: usize) -> HeapResult<()> {
        let memory = self.segment.memory_mut();
        let limit = memory.len();
        let within = |start: usize| start.checked_add(len).filter(|&end| end <= limit);

        let end = within(from).ok_or(HeapError::Corrupted { offset: from })?;
        within(to).ok_or(HeapError::Corrupted { offset: to })?;
        memory.copy_within(from..end, to);
        Ok(())
    }

    /// Mark the allocated block at `bp` free and merge it
    fn release(&mut self, bp: usize, size: usize) -> HeapResult<usize> {
        self.write_block(bp, size, false)?;
        self.coalesce(bp)
    }

    /// Merge the free block at `bp` with free neighbours; returns the payload
    /// offset of the merged block
    fn coalesce(&mut self, bp: usize) -> HeapResult<usize> {
        let prev_allocated = self.tag_at(bp - TAG_OVERHEAD)?.is_allocated();
        let next = self.next_block(bp)?;
        let next_allocated = self.tag_at(Self::header(next))?.is_allocated();
        let size = self.block_size(bp)?;

        match (prev_allocated, next_allocated) {
            (true, true) => Ok(bp),
            (true, false) => {
                let merged = size + self.block_size(next)?;
                self.write_block(bp, merged, false)?;
                Ok(bp)
            }
            (false, true) => {
                let prev = self.prev_block(bp)?;
                let merged = self.block_size(prev)? + size;
                self.write_block(prev, merged, false)?;
                Ok(prev)
            }
            (false, false) => {
                let prev = self.prev_block(bp)?;
                let merged = self.block_size(prev)? + size + self.block_size(next)?;
                self.write_block(prev, merged, false)?;
                Ok(prev)
            }
        }
    }

    /// Size of the allocated block at `bp`, if `bp` is the payload of one
    fn allocated_block_size(&self, bp: usize) -> Option<usize> {
        let end = self.segment.memory().len();
        if bp % ALIGNMENT != 0 || bp <= self.prologue || bp >= end {
            return None;
        }

        let header = self.tag_at(Self::header(bp)).ok()?;
        let size = header.size();
        if !header.is_allocated() || size < MIN_BLOCK_SIZE {
            return None;
        }
        let next = bp.checked_add(size).filter(|&next| next <= end)?;
        (self.tag_at(next - TAG_OVERHEAD).ok()? == header).then_some(size)
    }

    const fn header(bp: usize) -> usize {
        bp - WORD_SIZE
    }

    fn block_size(&self, bp: usize) -> HeapResult<usize> {
        self.tag_at(Self::header(bp)).map(BoundaryTag::size)
    }

    fn next_block(&self, bp: usize) -> HeapResult<usize> {
        Ok(bp + self.block_size(bp)?)
    }

    fn prev_block(&self, bp: usize) -> HeapResult<usize> {
        let size = self.tag_at(bp - TAG_OVERHEAD)?.size();
        bp.checked_sub(size).ok_or(HeapError::Corrupted { offset: bp })
    }

    /// Write matching header and footer tags. The footer goes first, so a
    /// block reaching past the break is refused before anything is written.
    fn write_block(&mut self, bp: usize, size: usize, allocated: bool) -> HeapResult<()> {
        let tag = BoundaryTag::new(size as u32, allocated);
        let footer = (bp + size)
            .checked_sub(TAG_OVERHEAD)
            .ok_or(HeapError::Corrupted { offset: bp })?;
        self.put_tag(footer, tag)?;
        self.put_tag(Self::header(bp), tag)
    }

    fn tag_at(&self, at: usize) -> HeapResult<BoundaryTag> {
        let corrupted = HeapError::Corrupted { offset: at };
        let end = at.checked_add(WORD_SIZE).ok_or(corrupted)?;
        let word = self.segment.memory().get(at..end).ok_or(corrupted)?;
        let raw: [u8; WORD_SIZE] = word.try_into().map_err(|_| corrupted)?;
        Ok(BoundaryTag::from_bytes(raw))
    }

    fn put_tag(&mut self, at: usize, tag: BoundaryTag) -> HeapResult<()> {
        let corrupted = HeapError::Corrupted { offset: at };
        let end = at.checked_add(WORD_SIZE).ok_or(corrupted)?;
        let word = self.segment.memory_mut().get_mut(at..end).ok_or(corrupted)?;
        word.copy_from_slice(&tag.to_bytes());
        Ok(())
    }
}

/// Iterator over the blocks of a [`Heap`]
#[derive(Debug)]
pub struct Blocks<'a, S: DataSegment> {
    heap: &'a Heap<S>,
    next: usize,
}

impl<S: DataSegment> Iterator for Blocks<'_, S> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let bp = self.next;
        if bp > self.heap.segment.memory().len() {
            return None;
        }
        let tag = self.heap.tag_at(Heap::<S>::header(bp)).ok()?;
        if tag.size() == 0 {
            return None;
        }

        self.next = bp + tag.size();
        Some(BlockInfo {
            payload: Payload(bp),
            size: tag.size(),
            allocated: tag.is_allocated(),
        })
    }
}
