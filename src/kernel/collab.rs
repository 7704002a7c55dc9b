//! Collaborator interfaces: the seams where this subsystem hands work to
//! the memory manager, the trap/arch layer, the filesystem, and the
//! console. All four are out of scope for this crate (see the purpose
//! note at the top of the repository); a real kernel binary supplies
//! concrete implementations and wires them into [`crate::proc::Procs`].
//!
//! The teacher kernel these traits are learned from wires this up with
//! concrete structs instead of trait objects (`crate::vm::Uvm`,
//! `crate::file::File`, `crate::fs::Inode`) because it only ever has one
//! implementation of each. This crate keeps the seam explicit as a trait
//! so the process subsystem can be built and unit-tested without linking
//! a real page-table or filesystem implementation at all.

use crate::error::ProcError;
use alloc::boxed::Box;
use alloc::sync::Arc;

/// A process's user address space: an opaque, resizable mapping plus the
/// operations `growproc`/`fork`/`freeproc` need. Concrete kernels back
/// this with a page table (sv39, in the reference kernel).
pub trait AddressSpace: Send {
    /// Current size of the mapping in bytes.
    fn size(&self) -> usize;

    /// Grows or shrinks the mapping to `new_size` bytes, returning the
    /// resulting size or an error if growth failed (shrink never fails).
    fn resize(&mut self, new_size: usize) -> Result<usize, ProcError>;

    /// Deep-copies this address space's contents into a fresh one of the
    /// same concrete type, used by `fork`.
    fn fork(&self) -> Result<Box<dyn AddressSpace>, ProcError>;

    /// Writes a 32-bit value to a user virtual address, translating
    /// through this address space's page table. Used by `wait`/`waitx`
    /// to report an exit status; fails with [`ProcError::BadAddress`] on
    /// an unmapped or unwritable page.
    fn copy_out_i32(&self, addr: usize, value: i32) -> Result<(), ProcError>;

    /// As [`AddressSpace::copy_out_i32`], for the 64-bit run/wait times
    /// `waitx` reports.
    fn copy_out_u64(&self, addr: usize, value: u64) -> Result<(), ProcError>;
}

/// A process's saved user register state, the seam between `fork`/
/// `userinit` and the arch layer's trap/return path. The reference
/// kernel's trap frame is a raw struct mapped at a fixed user virtual
/// address; this crate never reads or writes its fields itself beyond
/// the three lifecycle touch points below.
pub trait TrapFrame: Send {
    /// `fork()` returns 0 in the child; the parent keeps the real pid.
    fn set_return_value(&mut self, value: usize);

    /// `userinit` starts execution at `epc` with stack pointer `sp`.
    fn set_entry(&mut self, epc: usize, sp: usize);

    /// Deep-copies this frame, used by `fork`.
    fn fork(&self) -> Box<dyn TrapFrame>;
}

/// A reference-counted open file description. `fork` duplicates these
/// (`filedup`), `exit` drops them (`fileclose`).
pub trait FileHandle: Send + Sync {
    fn dup(self: Arc<Self>) -> Arc<dyn FileHandle>;
    fn close(&self);
}

/// A filesystem inode reference, used only for a process's current
/// working directory in this subsystem's scope.
pub trait Inode: Send + Sync {
    fn dup(self: Arc<Self>) -> Arc<dyn Inode>;
    fn put(&self);
}

/// The console/log sink for fatal errors. A real kernel's `panic` also
/// halts other harts; this crate only ever calls `fatal` from contexts
/// that are about to `panic!` themselves, so it is a logging seam, not a
/// substitute for `panic!`.
pub trait Console: Send + Sync {
    fn fatal(&self, message: &str);
}

/// One-shot filesystem initialization (`fsinit` in the reference kernel).
/// It has to run from the first process's first turn rather than during
/// early boot because it needs to read the root inode through a process
/// context capable of blocking, so [`crate::proc::scheduler::forkret`] is
/// the only caller.
pub trait Filesystem: Send + Sync {
    fn init(&self);
}
