#![cfg_attr(not(test), no_std)]
//! Process subsystem of a small teaching kernel: the fixed-size process
//! table, process lifecycle, the per-CPU scheduler (Round-Robin, FCFS and
//! Priority-Based Scheduling), and the sleep/wakeup rendezvous primitive
//! used for in-kernel blocking.
//!
//! Everything that would normally live below this layer -- page tables,
//! the trap/arch glue, the filesystem, the console -- is out of scope and
//! appears here only as a small set of collaborator traits (see
//! [`collab`]). A real kernel binary wires concrete implementations of
//! those traits in and drives [`proc::scheduler::run`] on each hart.

extern crate alloc;

pub mod arch;
pub mod collab;
pub mod condvar;
pub mod error;
pub mod lazy;
pub mod param;
pub mod proc;
pub mod spinlock;
pub mod syscall;

pub use error::ProcError;
