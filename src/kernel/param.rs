//! Tunable constants for the process subsystem, isolated the way the
//! rest of this kernel's configuration lives in one `param` module
//! instead of scattered literals.

/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Maximum number of CPUs.
pub const NCPU: usize = 8;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Maximum length of a process name, including the NUL terminator.
pub const MAXPROCNAME: usize = 16;

/// Page size in bytes, as assumed by `userinit`'s single-page `initcode`.
pub const PGSIZE: usize = 4096;

/// Default static priority assigned by `allocproc`.
pub const DEFAULT_PRIORITY: u32 = 60;

/// Default niceness assigned by `allocproc` and restored by `setpriority`.
pub const DEFAULT_NICENESS: u32 = 5;

/// Niceness is clamped to `0..=NICENESS_MAX`.
pub const NICENESS_MAX: u32 = 10;

/// Static and dynamic priority are clamped to `0..=PRIORITY_MAX`.
pub const PRIORITY_MAX: u32 = 100;
