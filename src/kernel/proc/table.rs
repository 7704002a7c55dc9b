//! Slot allocation and release (§4.A). `alloc_proc` linearly scans the
//! table, trying each slot's lock in turn, and returns with the winning
//! slot's lock still held -- callers finish initializing fields (the
//! trap frame, page table, kernel stack) before ever releasing it.

use super::pid::alloc_pid;
use super::{Proc, ProcInner, Procs, State};
use crate::error::ProcError;
use alloc::sync::Arc;

impl Procs {
    /// Scans for an UNUSED slot, claims it, and stamps the fields every
    /// process needs regardless of lifecycle op (`pid`, `ctime`, default
    /// priority/niceness). The caller still holds `inner`'s lock when
    /// this returns `Ok`, exactly as the reference kernel's
    /// `allocproc` returns with the slot locked.
    pub fn alloc_proc<'a>(
        &'a self,
        now: u64,
    ) -> Result<(Arc<Proc>, crate::spinlock::MutexGuard<'a, ProcInner>), ProcError> {
        for p in self.slots() {
            let mut guard = p.inner.lock();
            if guard.state != State::Unused {
                continue;
            }
            let pid = alloc_pid();
            guard.reset_for_alloc(pid, now);
            *p.data() = super::ProcData::default();
            return Ok((p.clone(), guard));
        }
        Err(ProcError::TableFull)
    }

    /// Releases a slot back to UNUSED. Requires the caller to hold
    /// `inner`'s lock (passed in and returned, so the caller can decide
    /// whether to keep holding it).
    pub fn free_proc<'a>(
        &self,
        p: &'a Proc,
        mut guard: crate::spinlock::MutexGuard<'a, ProcInner>,
    ) -> crate::spinlock::MutexGuard<'a, ProcInner> {
        guard.clear_for_free();
        *p.data() = super::ProcData::default();
        guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_locked_used_slot() {
        let procs = Procs::new();
        let (p, guard) = procs.alloc_proc(0).expect("table should not be full");
        assert_eq!(guard.state, State::Used);
        assert_ne!(guard.pid.0, 0);
        assert_eq!(guard.priority, crate::param::DEFAULT_PRIORITY);
        assert_eq!(guard.niceness, crate::param::DEFAULT_NICENESS);
        let guard = procs.free_proc(&p, guard);
        assert_eq!(guard.state, State::Unused);
        assert_eq!(guard.pid.0, 0);
    }

    #[test]
    fn table_full_returns_err() {
        let procs = Procs::new();
        let mut held = alloc::vec::Vec::new();
        loop {
            match procs.alloc_proc(0) {
                Ok((p, g)) => held.push((p, g)),
                Err(e) => {
                    assert_eq!(e, ProcError::TableFull);
                    break;
                }
            }
        }
        for (p, g) in held {
            procs.free_proc(&p, g);
        }
    }
}
