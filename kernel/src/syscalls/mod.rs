//! System call Interface
//!
//! The shared-frame system calls as a user process sees them. The trap
//! handler decodes the call number and argument registers and hands them to
//! [`dispatch`], which runs the table operation for the current process and
//! folds the result into one signed return register.
//!
//! # System Call Convention (RISC-V)
//!
//! ```text
//! - System call number in a7
//! - Arguments in a0-a5
//! - Return value in a0, -1 on any failure
//! ```
//!
//! | call             | arguments        | success value    |
//! |------------------|------------------|------------------|
//! | `shmget`         | -                | handle           |
//! | `shmattach`      | handle, address  | 0                |
//! | `shmdetach`      | handle           | 0                |
//! | `shmqueryperm`   | handle           | permission bits  |
//! | `shmsetperm`     | handle, perm     | 0                |

#![deny(missing_docs)]

use crate::debug_print;
use crate::memory::{FrameAllocator, PageMapper, VirtualAddress};
use crate::shm::{ShmError, ShmId, ShmPermissions, ShmResult, ShmTable};

/// Maximum number of system call arguments
pub const MAX_SYSCALL_ARGS: usize = 6;

/// Raw argument registers
pub type SyscallArgs = [usize; MAX_SYSCALL_ARGS];

/// Value returned to user space on failure
pub const SYSCALL_ERROR: isize = -1;

/// System call numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SystemCallNumber {
    /// Create a shared frame
    ShmGet = 22,
    /// Map a shared frame into the caller
    ShmAttach = 23,
    /// Drop one attachment
    ShmDetach = 24,
    /// Read the permission bits
    ShmQueryPerm = 25,
    /// Write the permission bits
    ShmSetPerm = 26,
}

impl TryFrom<u32> for SystemCallNumber {
    type Error = u32;

    fn try_from(number: u32) -> Result<Self, Self::Error> {
        match number {
            22 => Ok(Self::ShmGet),
            23 => Ok(Self::ShmAttach),
            24 => Ok(Self::ShmDetach),
            25 => Ok(Self::ShmQueryPerm),
            26 => Ok(Self::ShmSetPerm),
            other => Err(other),
        }
    }
}

/// What a system call needs from the running kernel: the frame allocator
/// and the page table of the process that trapped.
pub trait KernelContext {
    /// Frame allocator type
    type Frames: FrameAllocator + ?Sized;
    /// Page table type of a process
    type Space: PageMapper + ?Sized;

    /// The kernel frame allocator
    fn frames(&mut self) -> &mut Self::Frames;

    /// Page table of the calling process
    fn current_address_space(&mut self) -> &mut Self::Space;
}

/// Run one shared-frame system call on behalf of the current process.
///
/// Unknown call numbers, malformed arguments and every table error return
/// [`SYSCALL_ERROR`].
pub fn dispatch<const N: usize, C>(
    table: &ShmTable<N>,
    ctx: &mut C,
    number: u32,
    args: &SyscallArgs,
) -> isize
where
    C: KernelContext + ?Sized,
{
    let Ok(call) = SystemCallNumber::try_from(number) else {
        debug_print!(WARN, "syscall: unknown number {}", number);
        return SYSCALL_ERROR;
    };

    let [a0, a1, ..] = *args;
    let result = match call {
        SystemCallNumber::ShmGet => table
            .create(ctx.frames())
            .map(|id| id.as_u32() as isize),
        SystemCallNumber::ShmAttach => shm_id(a0).and_then(|id| {
            let va = VirtualAddress::new(a1);
            table.attach(id, va, ctx.current_address_space()).map(|()| 0)
        }),
        SystemCallNumber::ShmDetach => {
            shm_id(a0).and_then(|id| table.detach(id, ctx.frames()).map(|()| 0))
        }
        SystemCallNumber::ShmQueryPerm => shm_id(a0)
            .and_then(|id| table.permission(id))
            .map(|perm| perm.bits() as isize),
        SystemCallNumber::ShmSetPerm => shm_id(a0).and_then(|id| {
            // The permission argument is a C `int`; keep its low 32 bits
            let perm = ShmPermissions::from_bits_retain(a1 as u32);
            table.set_permission(id, perm).map(|()| 0)
        }),
    };

    result.unwrap_or_else(|err| {
        debug_print!(DEBUG, "syscall {:?} failed: {}", call, err);
        SYSCALL_ERROR
    })
}

/// Handle from an argument register; a negative `int` arrives sign-extended
/// and lands outside `u32`
fn shm_id(arg: usize) -> ShmResult<ShmId> {
    u32::try_from(arg)
        .map(ShmId::new)
        .map_err(|_| ShmError::InvalidHandle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AddressSpace, FramePool, PhysicalAddress};

    struct Machine {
        frames: FramePool<4>,
        space: AddressSpace,
    }

    impl KernelContext for Machine {
        type Frames = FramePool<4>;
        type Space = AddressSpace;

        fn frames(&mut self) -> &mut Self::Frames {
            &mut self.frames
        }

        fn current_address_space(&mut self) -> &mut Self::Space {
            &mut self.space
        }
    }

    fn machine() -> Machine {
        Machine {
            frames: FramePool::new(PhysicalAddress::new(0x8800_0000)).unwrap(),
            space: AddressSpace::new(),
        }
    }

    fn call(table: &ShmTable<2>, m: &mut Machine, nr: SystemCallNumber, a0: usize, a1: usize) -> isize {
        dispatch(table, m, nr as u32, &[a0, a1, 0, 0, 0, 0])
    }

    #[test]
    fn full_lifecycle_through_syscalls() {
        let table = ShmTable::<2>::new();
        let mut m = machine();

        let id = call(&table, &mut m, SystemCallNumber::ShmGet, 0, 0);
        assert_eq!(id, 0);
        let id = id as usize;

        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmSetPerm, id, 0b11), 0);
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmQueryPerm, id, 0), 0b11);
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmAttach, id, 0x5000), 0);
        assert!(m.space.translate(VirtualAddress::new(0x5000)).is_some());
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmDetach, id, 0), 0);
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmQueryPerm, id, 0), SYSCALL_ERROR);
    }

    #[test]
    fn errors_collapse_to_minus_one() {
        let table = ShmTable::<2>::new();
        let mut m = machine();
        let negative_one = -1isize as usize;

        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmDetach, negative_one, 0), SYSCALL_ERROR);
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmAttach, 7, 0x5000), SYSCALL_ERROR);
        assert_eq!(dispatch(&table, &mut m, 999, &[0; MAX_SYSCALL_ARGS]), SYSCALL_ERROR);

        call(&table, &mut m, SystemCallNumber::ShmGet, 0, 0);
        call(&table, &mut m, SystemCallNumber::ShmGet, 0, 0);
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmGet, 0, 0), SYSCALL_ERROR);
    }

    #[test]
    fn unnamed_permission_bits_round_trip() {
        let table = ShmTable::<2>::new();
        let mut m = machine();
        let id = call(&table, &mut m, SystemCallNumber::ShmGet, 0, 0) as usize;

        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmSetPerm, id, 0x1F0), 0);
        assert_eq!(call(&table, &mut m, SystemCallNumber::ShmQueryPerm, id, 0), 0x1F0);
    }

    #[test]
    fn numbers_round_trip() {
        for nr in [
            SystemCallNumber::ShmGet,
            SystemCallNumber::ShmAttach,
            SystemCallNumber::ShmDetach,
            SystemCallNumber::ShmQueryPerm,
            SystemCallNumber::ShmSetPerm,
        ] {
            assert_eq!(SystemCallNumber::try_from(nr as u32), Ok(nr));
        }
        assert_eq!(SystemCallNumber::try_from(21), Err(21));
    }
}
