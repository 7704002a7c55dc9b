//! The per-CPU scheduler loop and the three interchangeable selection
//! policies (§4.F). Selection is factored out behind [`SchedulerPolicy`]
//! per the design notes' "build-time policy selection -> runtime
//! strategy object": the loop itself never knows which policy is active,
//! only that `select` hands back a locked, `Running` slot or `None`.
//!
//! Each policy's `select` is deliberately self-contained -- it does its
//! own per-slot locking, comparison, and promotion -- so it can be
//! exercised directly in tests without a real context switch ever
//! happening.

use super::{Proc, ProcInner, Procs, State};
use crate::param::{NICENESS_MAX, PRIORITY_MAX};
use crate::spinlock::MutexGuard;
use alloc::sync::Arc;

/// A runtime-selectable scheduling strategy (design note 9). `select`
/// returns the process to run next with its slot lock held and already
/// promoted to `Running`, or `None` if nothing is runnable this pass.
pub trait SchedulerPolicy: Send + Sync {
    fn select<'a>(&self, procs: &'a Procs) -> Option<(Arc<Proc>, MutexGuard<'a, ProcInner>)>;

    /// Whether the timer trap may call `yield` under this policy. Only
    /// FCFS says no (§4.F: "FCFS is non-preemptive by contract").
    fn preemptible(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str;
}

/// Picks the first `Runnable` slot encountered, in index order. No
/// fairness beyond whatever order the timer's `yield`s produce.
pub struct RoundRobin;

impl SchedulerPolicy for RoundRobin {
    fn select<'a>(&self, procs: &'a Procs) -> Option<(Arc<Proc>, MutexGuard<'a, ProcInner>)> {
        for p in procs.slots() {
            let mut guard = p.inner.lock();
            if guard.state == State::Runnable {
                guard.state = State::Running;
                return Some((p.clone(), guard));
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Holds at most one candidate's lock (plus, momentarily, a challenger's
/// while comparing) and always releases the losing lock before moving on
/// -- the "earlier candidate released before the later is promoted"
/// rule from §3, invariant 6.
fn select_by_key<'a, K, F>(procs: &'a Procs, key_of: F) -> Option<(Arc<Proc>, MutexGuard<'a, ProcInner>)>
where
    K: PartialOrd + Copy,
    F: Fn(&ProcInner) -> K,
{
    let mut best: Option<(Arc<Proc>, MutexGuard<'a, ProcInner>, K)> = None;
    for p in procs.slots() {
        let guard = p.inner.lock();
        if guard.state != State::Runnable {
            continue;
        }
        let key = key_of(&guard);
        match best {
            Some((_, _, ref best_key)) if !(key < *best_key) => {
                // challenger loses; its lock (`guard`) drops here.
            }
            _ => {
                best = Some((p.clone(), guard, key));
            }
        }
    }
    best.map(|(p, g, _)| (p, g))
}

/// Runs the `Runnable` process with the lowest `ctime` (earliest fork),
/// ties broken by lower slot index. Non-preemptive.
pub struct Fcfs;

impl SchedulerPolicy for Fcfs {
    fn select<'a>(&self, procs: &'a Procs) -> Option<(Arc<Proc>, MutexGuard<'a, ProcInner>)> {
        select_by_key(procs, |inner| inner.ctime).map(|(p, mut g)| {
            g.state = State::Running;
            (p, g)
        })
    }

    fn preemptible(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "fcfs"
    }
}

/// `niceness = floor(stime / (rtime + stime) * 10)`, 0 when the process
/// hasn't slept at all. `dp = clamp(priority - niceness + 5, 0, 100)`.
pub fn dynamic_priority(priority: u32, rtime: u64, stime: u64) -> u32 {
    let niceness = if rtime + stime > 0 && stime > 0 {
        ((stime * 10) / (rtime + stime)) as u32
    } else {
        0
    };
    let niceness = niceness.min(NICENESS_MAX);
    let raw = priority as i64 - niceness as i64 + 5;
    raw.clamp(0, PRIORITY_MAX as i64) as u32
}

/// Runs the `Runnable` process with the lowest dynamic priority (lower
/// runs first), ties broken by lower slot index.
pub struct Pbs;

impl SchedulerPolicy for Pbs {
    fn select<'a>(&self, procs: &'a Procs) -> Option<(Arc<Proc>, MutexGuard<'a, ProcInner>)> {
        let picked = select_by_key(procs, |inner| {
            dynamic_priority(inner.priority, inner.rtime, inner.stime)
        });
        picked.map(|(p, mut g)| {
            g.dynamic_priority = dynamic_priority(g.priority, g.rtime, g.stime);
            g.num_of_runs += 1;
            g.state = State::Running;
            (p, g)
        })
    }

    fn name(&self) -> &'static str {
        "pbs"
    }
}

/// `setpriority(new, pid)`: resets niceness to the default and stores
/// `new`, returning the previous priority.
pub fn set_priority(procs: &Procs, pid: super::Pid, new: u32) -> Result<u32, crate::error::ProcError> {
    if new > PRIORITY_MAX {
        return Err(crate::error::ProcError::InvalidPriority);
    }
    let (_p, mut guard) = procs
        .find_by_pid(pid)
        .ok_or(crate::error::ProcError::NoSuchProcess)?;
    let old = guard.priority;
    guard.priority = new;
    guard.niceness = crate::param::DEFAULT_NICENESS;
    Ok(old)
}

/// The non-returning per-CPU scheduler loop. Never compiled under test:
/// it spins forever by design and its only interesting behavior (which
/// process gets chosen) already lives in, and is tested through, the
/// policies above.
#[cfg(not(test))]
pub fn run(procs: &'static Procs, policy: &dyn SchedulerPolicy) -> ! {
    use super::CPUS;
    use core::mem::ManuallyDrop;

    log::info!("cpu {} entering scheduler ({})", crate::arch::cpuid(), policy.name());
    loop {
        crate::arch::intr_on();
        if let Some((p, guard)) = policy.select(procs) {
            let cpu = CPUS.my_cpu();
            cpu.set_current(Some(p.clone()));

            // The lock must stay held across the switch (§4.F); the
            // process releases it itself once running, and reacquires
            // it before calling back into `sched`. We therefore leak the
            // guard's drop here rather than run it.
            let guard = ManuallyDrop::new(guard);
            let proc_ctx = &guard.context as *const crate::arch::Context;
            let sched_ctx = cpu.scheduler_context_mut();
            unsafe { crate::arch::swtch(sched_ctx, proc_ctx) };

            cpu.set_current(None);
        }
    }
}

/// Transfers control from a running process back to this CPU's scheduler
/// loop. Requires `guard` to be the caller's own, already-updated slot
/// lock and interrupts to be off; returns once this process has been
/// rescheduled.
#[cfg(not(test))]
pub fn sched<'a>(
    p: &Proc,
    guard: MutexGuard<'a, ProcInner>,
) -> MutexGuard<'a, ProcInner> {
    use super::CPUS;
    use core::mem::ManuallyDrop;

    assert!(!crate::arch::intr_get(), "sched: interruptible");
    assert_ne!(guard.state, State::Running, "sched: still running");

    let cpu = CPUS.my_cpu();
    let guard = ManuallyDrop::new(guard);
    let proc_ctx = &guard.context as *const _ as *mut crate::arch::Context;
    let sched_ctx = cpu.scheduler_context_mut() as *const crate::arch::Context;
    unsafe { crate::arch::swtch(proc_ctx, sched_ctx) };

    // Resumed: reconstruct ownership of the guard we leaked above.
    let _ = p;
    ManuallyDrop::into_inner(guard)
}

/// The canonical preemption point (§4.E/§4.F): lock the caller's own slot,
/// demote it from `Running` back to `Runnable`, hand off to the scheduler
/// via `sched`, and release once rescheduled. The timer trap calls this on
/// every tick, except under a policy whose [`SchedulerPolicy::preemptible`]
/// says no.
#[cfg(not(test))]
pub fn yielding(p: &Proc) {
    let mut guard = p.inner.lock();
    guard.state = State::Runnable;
    let guard = sched(p, guard);
    drop(guard);
}

/// The address every freshly allocated process's `context.ra` is set to
/// (§4.A). A fresh process's first "return" from `swtch` lands here
/// instead of back in `sched`'s call stack, because it has never called
/// `sched` in the first place -- the scheduler's `run` loop switched into
/// it directly and left its slot lock held on its behalf.
///
/// `forkret` releases that inherited lock, runs the one-shot filesystem
/// init the very first time any process reaches here, and then falls
/// through to the trap layer's return-to-user path (out of this crate's
/// scope; a real kernel binary's trampoline does this after calling in).
///
/// Never called directly by anything in this crate: `context.ra` only
/// ever reaches it through the real `swtch` trampoline, which this crate
/// does not implement (see [`crate::arch::swtch`]).
#[cfg(not(test))]
pub fn forkret() {
    use super::CPUS;
    use core::sync::atomic::{AtomicBool, Ordering};

    static FIRST_RETURN: AtomicBool = AtomicBool::new(true);

    let p = CPUS.my_proc().expect("forkret: no current process");
    unsafe { p.inner.force_unlock() };

    if FIRST_RETURN.swap(false, Ordering::AcqRel) {
        match crate::proc::PROCS.filesystem() {
            Some(fs) => fs.init(),
            None => {
                let message = "forkret: no filesystem collaborator wired";
                if let Some(console) = crate::proc::PROCS.console() {
                    console.fatal(message);
                }
                panic!("{}", message);
            }
        }
    }
}
