//! Tick-driven accounting (§4.G). The timer subsystem owns the raw tick
//! source; this module only holds the counter the process table reads,
//! and the per-tick sweep that feeds `rtime`/`stime`.

use super::{Procs, State};
use core::sync::atomic::{AtomicU64, Ordering};

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Advances the tick counter by one and returns the new value. Called
/// once per timer interrupt from the trap layer.
pub fn tick() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

impl Procs {
    /// For every slot, under its own lock: `rtime += 1` if `Running`,
    /// `stime += 1` if `Sleeping`.
    pub fn update_time(&self) {
        for p in self.slots() {
            let mut guard = p.inner.lock();
            match guard.state {
                State::Running => guard.rtime += 1,
                State::Sleeping => guard.stime += 1,
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::Procs;

    #[test]
    fn update_time_only_touches_running_and_sleeping() {
        let procs = Procs::new();
        let (running, mut g) = procs.alloc_proc(0).unwrap();
        g.state = State::Running;
        drop(g);
        let (sleeping, mut g) = procs.alloc_proc(0).unwrap();
        g.state = State::Sleeping;
        drop(g);
        let (runnable, mut g) = procs.alloc_proc(0).unwrap();
        g.state = State::Runnable;
        drop(g);

        procs.update_time();

        assert_eq!(running.inner.lock().rtime, 1);
        assert_eq!(sleeping.inner.lock().stime, 1);
        assert_eq!(runnable.inner.lock().rtime, 0);
        assert_eq!(runnable.inner.lock().stime, 0);
    }

    #[test]
    fn sum_property_holds_after_several_ticks() {
        // Property 6: rtime + stime <= etime - ctime.
        let procs = Procs::new();
        let (p, mut g) = procs.alloc_proc(5).unwrap();
        g.state = State::Running;
        drop(g);
        for _ in 0..10 {
            procs.update_time();
        }
        {
            let mut g = p.inner.lock();
            g.state = State::Sleeping;
        }
        for _ in 0..10 {
            procs.update_time();
        }
        let g = p.inner.lock();
        let etime = g.ctime + 25; // 10 running + 10 sleeping + 5 idle ticks elapsed
        assert!(g.rtime + g.stime <= etime - g.ctime);
    }
}
