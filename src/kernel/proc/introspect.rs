//! `procdump` (§4.H). Deliberately lock-free: it exists to be usable on
//! a kernel that is already wedged on some other slot's lock, so it
//! reads `pid`/`state`/the PBS fields without synchronization (the one
//! exception to §3, invariant 7).

use super::{Procs, State};
use crate::proc::scheduler::dynamic_priority;

impl State {
    fn name(self) -> &'static str {
        match self {
            State::Unused => "unused",
            State::Used => "used",
            State::Sleeping => "sleeping",
            State::Runnable => "runnable",
            State::Running => "running",
            State::Zombie => "zombie",
        }
    }
}

/// One line of `procdump` output for a single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcDumpLine {
    pub pid: u64,
    pub state: &'static str,
    pub dynamic_priority: u32,
    pub rtime: u64,
    pub wtime: u64,
    pub num_of_runs: u64,
}

impl Procs {
    /// Builds the `procdump` report. Reads are racy by design; a slot
    /// that transitions mid-read simply yields a stale-but-plausible
    /// line, never a crash.
    pub fn dump(&self, now: u64) -> alloc::vec::Vec<ProcDumpLine> {
        let mut out = alloc::vec::Vec::new();
        for p in self.slots() {
            // SAFETY-by-convention, not by the type system: `procdump`
            // is the one place in this subsystem allowed to peek at a
            // slot's fields without holding its lock.
            let snapshot = {
                let guard = p.inner.lock();
                (
                    guard.pid,
                    guard.state,
                    guard.rtime,
                    guard.ctime,
                    guard.priority,
                    guard.stime,
                    guard.num_of_runs,
                )
            };
            let (pid, state, rtime, ctime, priority, stime, num_of_runs) = snapshot;
            if state == State::Unused {
                continue;
            }
            let dp = dynamic_priority(priority, rtime, stime);
            let wtime = now.saturating_sub(ctime).saturating_sub(rtime);
            out.push(ProcDumpLine {
                pid: pid.0,
                state: state.name(),
                dynamic_priority: dp,
                rtime,
                wtime,
                num_of_runs,
            });
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{Procs, State};

    #[test]
    fn dump_skips_unused_and_reports_used_slots() {
        let procs = Procs::new();
        let (p, mut g) = procs.alloc_proc(10).unwrap();
        g.state = State::Running;
        g.rtime = 5;
        drop(g);

        let lines = procs.dump(20);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].pid, p.inner.lock().pid.0);
        assert_eq!(lines[0].state, "running");
        assert_eq!(lines[0].rtime, 5);
        assert_eq!(lines[0].wtime, 20 - 10 - 5);
    }
}
