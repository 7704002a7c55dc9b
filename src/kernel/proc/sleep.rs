//! Channel-based sleep/wakeup (§4.D). A channel is any `usize`-sized
//! opaque token; callers rendezvous by sharing the same value, typically
//! the address of the object they're both watching (a slot, a condvar).
//!
//! The crucial property, preserved here exactly as described: because
//! `wakeup` takes the sleeper's slot lock before testing its channel,
//! and `sleep` sets `Sleeping` while holding that same lock, a wakeup
//! can never be lost in the window between a caller releasing its own
//! lock and the sleeper actually blocking.

use super::{Proc, Procs, State};
use crate::spinlock::{Mutex, MutexGuard};

impl Proc {
    /// Puts the calling process (`self`) to sleep on `chan`, releasing
    /// `lk` while asleep and reacquiring it before returning.
    pub fn sleep<'a, T>(&self, chan: usize, lk: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
        let mut guard = self.inner.lock();
        let held = Mutex::unlock(lk);

        guard.chan = chan;
        guard.state = State::Sleeping;
        log::trace!("pid {} sleeping on chan {:#x}", guard.pid.0, chan);

        #[cfg(not(test))]
        let mut guard = super::scheduler::sched(self, guard);

        #[cfg(test)]
        let mut guard = {
            // There is no real scheduler loop driving context switches in
            // a host unit test. Block the calling OS thread until another
            // thread's `wakeup` flips our state back, which is the
            // observable behavior `sched()` would eventually produce.
            drop(guard);
            loop {
                let g = self.inner.lock();
                if g.state != State::Sleeping {
                    break g;
                }
                drop(g);
                std::thread::yield_now();
            }
        };

        guard.chan = 0;
        drop(guard);
        held.lock()
    }
}

impl Procs {
    /// Wakes every process sleeping on `chan`. Promotes them to
    /// `Runnable`; the sleeper itself clears `chan` when it reacquires
    /// its own lock in [`Proc::sleep`] above.
    pub fn wakeup(&self, chan: usize) {
        if chan == 0 {
            return;
        }
        for p in self.slots() {
            let mut guard = p.inner.lock();
            if guard.state == State::Sleeping && guard.chan == chan {
                guard.state = State::Runnable;
                log::trace!("pid {} woken on chan {:#x}", guard.pid.0, chan);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spinlock::Mutex as KMutex;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wake_loss_freedom() {
        // Thread B goes to sleep on `chan`; thread A sets a flag then
        // calls wakeup(chan). B must observe Runnable before wakeup
        // returns to A (property 8).
        let procs = Procs::new();
        let (p, guard) = procs.alloc_proc(0).unwrap();
        drop(guard);

        let lock: StdArc<KMutex<bool>> = StdArc::new(KMutex::new(false, "cond"));
        let chan = 0xdead_beef;

        let p_b = p.clone();
        let lock_b = lock.clone();
        let b = thread::spawn(move || {
            let guard = lock_b.lock();
            let _guard = p_b.sleep(chan, guard);
        });

        thread::sleep(Duration::from_millis(20));
        {
            let mut g = lock.lock();
            *g = true;
        }
        procs.wakeup(chan);
        b.join().unwrap();

        assert_ne!(p.inner.lock().state, State::Sleeping);
    }

    #[test]
    fn wakeup_ignores_other_channels() {
        let procs = Procs::new();
        let (p, mut guard) = procs.alloc_proc(0).unwrap();
        guard.state = State::Sleeping;
        guard.chan = 1;
        drop(guard);

        procs.wakeup(2);
        assert_eq!(p.inner.lock().state, State::Sleeping);
        procs.wakeup(1);
        assert_eq!(p.inner.lock().state, State::Runnable);
    }
}
