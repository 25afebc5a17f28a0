//! Boundary tag encoding
//!
//! A tag is one little-endian `u32`: the block size in the high bits and the
//! allocated flag in bit 0. Block sizes are multiples of [`ALIGNMENT`], so
//! the low three bits of the size are always zero and free for flags.

use crate::config::{ALIGNMENT, WORD_SIZE};

const ALLOCATED_BIT: u32 = 0x1;
const FLAG_MASK: u32 = (ALIGNMENT as u32) - 1;

/// Decoded header or footer word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryTag {
    size: u32,
    allocated: bool,
}

impl BoundaryTag {
    /// Tag for a block of `size` bytes; the low flag bits of `size` are
    /// dropped
    pub const fn new(size: u32, allocated: bool) -> Self {
        Self {
            size: size & !FLAG_MASK,
            allocated,
        }
    }

    /// Block size in bytes, tags included
    pub const fn size(self) -> usize {
        self.size as usize
    }

    /// Whether the block is handed out
    pub const fn is_allocated(self) -> bool {
        self.allocated
    }

    /// Pack into one word
    pub const fn encode(self) -> u32 {
        if self.allocated {
            self.size | ALLOCATED_BIT
        } else {
            self.size
        }
    }

    /// Unpack a word
    pub const fn decode(word: u32) -> Self {
        Self {
            size: word & !FLAG_MASK,
            allocated: word & ALLOCATED_BIT != 0,
        }
    }

    /// Bytes as stored in the arena
    pub const fn to_bytes(self) -> [u8; WORD_SIZE] {
        self.encode().to_le_bytes()
    }

    /// Tag stored in `bytes`
    pub const fn from_bytes(bytes: [u8; WORD_SIZE]) -> Self {
        Self::decode(u32::from_le_bytes(bytes))
    }
}
