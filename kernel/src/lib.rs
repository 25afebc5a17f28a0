//! Frameshare Kernel Library
//!
//! Kernel-resident shared memory for a small multitasking kernel. Unrelated
//! address spaces attach the same physical frame through a small, fixed-size
//! table of reference-counted slots.
//!
//! # Architecture
//!
//! - [`memory`] defines the addresses, page flags and the two collaborator
//!   seams the table needs: a [`memory::FrameAllocator`] and a
//!   [`memory::PageMapper`]. A frame pool and a software address space are
//!   provided for boot-time use and for tests.
//! - [`shm`] owns the shared-frame table itself.
//! - [`syscalls`] turns table results into the integer return convention
//!   seen by user processes.
//!
//! # Safety
//!
//! The crate contains no `unsafe` code. Frame contents are reached through
//! the frame pool's byte views; the page table is modelled, not poked.

#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
#![warn(clippy::panic)]
#![warn(clippy::unwrap_used)]

extern crate alloc;

#[doc(hidden)]
pub use log as __log;

pub mod macros;
pub mod memory;
pub mod shm;
pub mod syscalls;

pub use shm::{SHM_TABLE, ShmError, ShmId, ShmPermissions, ShmResult, ShmTable};
