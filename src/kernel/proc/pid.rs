//! The PID allocator (§4.B): `nextpid` under `pid_lock`, monotonic and
//! never reused. A 64-bit counter comfortably outlives any run of this
//! teaching kernel, so there is no wraparound handling.

use crate::spinlock::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Pid(pub u64);

impl Pid {
    pub const NONE: Pid = Pid(0);
}

struct PidAllocator {
    next: Mutex<u64>,
}

static ALLOCATOR: PidAllocator = PidAllocator {
    next: Mutex::new(1, "pid_lock"),
};

/// Returns a fresh PID. PIDs start at 1; 0 is reserved to mean "no pid" /
/// an UNUSED slot (§3, invariant 2).
pub fn alloc_pid() -> Pid {
    let mut next = ALLOCATOR.next.lock();
    let pid = Pid(*next);
    *next += 1;
    pid
}
