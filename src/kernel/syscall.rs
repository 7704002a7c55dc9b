//! Process-subsystem syscalls (§5). Argument fetching (reading `a0..a5`
//! out of a trap frame, validating user pointers) is the trap layer's
//! job and out of scope here; each `sys_*` wrapper below takes its
//! arguments already extracted and returns the C-ABI `-1`/value
//! convention a real syscall dispatcher writes back into `a0`.

use crate::error::ProcError;
use crate::param::PRIORITY_MAX;
use crate::proc::{Pid, Proc, PROCS};
use alloc::sync::Arc;

/// Syscall numbers this subsystem answers for. A real kernel's dispatch
/// table also carries filesystem/console syscall numbers interleaved
/// with these; this enum only names the ones routed into this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysCallNum {
    Fork = 1,
    Exit = 2,
    Wait = 3,
    Waitx = 4,
    Kill = 5,
    SetPriority = 6,
    Sbrk = 7,
    Getpid = 8,
    Sleep = 9,
    Uptime = 10,
}

impl core::convert::TryFrom<usize> for SysCallNum {
    type Error = ();

    fn try_from(n: usize) -> Result<Self, ()> {
        Ok(match n {
            1 => SysCallNum::Fork,
            2 => SysCallNum::Exit,
            3 => SysCallNum::Wait,
            4 => SysCallNum::Waitx,
            5 => SysCallNum::Kill,
            6 => SysCallNum::SetPriority,
            7 => SysCallNum::Sbrk,
            8 => SysCallNum::Getpid,
            9 => SysCallNum::Sleep,
            10 => SysCallNum::Uptime,
            _ => return Err(()),
        })
    }
}

fn flatten<T: Into<isize>>(result: Result<T, ProcError>) -> isize {
    match result {
        Ok(v) => v.into(),
        Err(e) => {
            log::debug!("syscall failed: {}", e);
            e.to_retval()
        }
    }
}

impl From<Pid> for isize {
    fn from(pid: Pid) -> isize {
        pid.0 as isize
    }
}

pub fn sys_fork(caller: &Arc<Proc>, now: u64) -> isize {
    flatten(PROCS.fork(caller, now))
}

/// `exit` never returns to its caller on real hardware; under test there
/// is no scheduler to switch away to, so this wrapper only performs the
/// bookkeeping half (`exit_prepare`) and is not meant to be exercised
/// for its control-flow behavior.
#[cfg(not(test))]
pub fn sys_exit(caller: &'static Arc<Proc>, status: i32, now: u64) -> ! {
    super::proc::lifecycle::exit(&PROCS, caller, status, now)
}

pub fn sys_wait(caller: &Arc<Proc>, status_addr: Option<usize>) -> isize {
    flatten(PROCS.wait(caller, status_addr))
}

pub fn sys_waitx(
    caller: &Arc<Proc>,
    status_addr: Option<usize>,
    rtime_addr: Option<usize>,
    wtime_addr: Option<usize>,
) -> isize {
    flatten(PROCS.waitx(caller, status_addr, rtime_addr, wtime_addr))
}

pub fn sys_kill(pid: u64) -> isize {
    match PROCS.kill(Pid(pid)) {
        Ok(()) => 0,
        Err(e) => e.to_retval(),
    }
}

pub fn sys_set_priority(pid: u64, priority: u32) -> isize {
    if priority > PRIORITY_MAX {
        return ProcError::InvalidPriority.to_retval();
    }
    flatten(
        super::proc::scheduler::set_priority(&PROCS, Pid(pid), priority)
            .map(|old| old as isize),
    )
}

pub fn sys_sbrk(caller: &Arc<Proc>, delta: isize) -> isize {
    flatten(PROCS.growproc(caller, delta).map(|sz| sz as isize))
}

pub fn sys_getpid(caller: &Arc<Proc>) -> u64 {
    caller.inner.lock().pid.0
}

pub fn sys_uptime() -> u64 {
    super::proc::time::ticks()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::{Procs, State};

    #[test]
    fn sys_kill_maps_no_such_process_to_retval() {
        let procs = Procs::new();
        let _ = procs; // sys_kill always targets the global PROCS; this
                        // test only checks the error-to-retval mapping.
        assert_eq!(sys_kill(999_999), ProcError::NoSuchProcess.to_retval());
    }

    #[test]
    fn sys_set_priority_rejects_out_of_range_before_touching_the_table() {
        assert_eq!(
            sys_set_priority(1, PRIORITY_MAX + 1),
            ProcError::InvalidPriority.to_retval()
        );
    }

    #[test]
    fn sys_getpid_reads_current_pid() {
        let procs = Procs::new();
        let (p, mut g) = procs.alloc_proc(0).unwrap();
        g.state = State::Runnable;
        drop(g);
        let pid = p.inner.lock().pid.0;
        assert_eq!(sys_getpid(&p), pid);
    }
}
