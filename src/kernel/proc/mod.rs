//! The process table, per-process state, and the operations built on top
//! of them. Submodules split the work the way the design notes describe:
//! a pure PID source ([`pid`]), slot allocation ([`table`]), the
//! lifecycle operations ([`lifecycle`]), the sleep/wakeup rendezvous
//! ([`sleep`]), the three scheduler policies and the per-CPU loop
//! ([`scheduler`]), tick-driven accounting ([`time`]), and introspection
//! ([`introspect`]).

pub mod introspect;
pub mod lifecycle;
pub mod pid;
pub mod scheduler;
pub mod sleep;
pub mod table;
pub mod time;

use crate::arch::Context;
use crate::collab::{AddressSpace, Console, FileHandle, Filesystem, Inode, TrapFrame};
use crate::lazy::SyncLazy;
use crate::param::{DEFAULT_NICENESS, DEFAULT_PRIORITY, NCPU, NOFILE, NPROC};
use crate::spinlock::{IntrNesting, Mutex, MutexGuard};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use array_macro::array;
use core::cell::UnsafeCell;

pub use pid::Pid;

/// A process slot's lifecycle state (§3, invariant 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl Default for State {
    fn default() -> Self {
        State::Unused
    }
}

/// Everything about a slot that is mutated only while its own spinlock is
/// held: scheduling state, timing fields, and the PBS fields.
#[derive(Default)]
pub struct ProcInner {
    pub state: State,
    /// Sleep channel; nonzero iff `state == Sleeping` (§3, invariant 4).
    pub chan: usize,
    pub killed: bool,
    pub xstate: i32,
    pub pid: Pid,
    pub ctime: u64,
    pub rtime: u64,
    pub stime: u64,
    pub etime: u64,
    pub num_of_runs: u64,
    pub priority: u32,
    pub niceness: u32,
    pub dynamic_priority: u32,
    pub context: Context,
}

impl ProcInner {
    fn reset_for_alloc(&mut self, pid: Pid, ctime: u64) {
        self.state = State::Used;
        self.chan = 0;
        self.killed = false;
        self.xstate = 0;
        self.pid = pid;
        self.ctime = ctime;
        self.rtime = 0;
        self.stime = 0;
        self.etime = 0;
        self.num_of_runs = 0;
        self.priority = DEFAULT_PRIORITY;
        self.niceness = DEFAULT_NICENESS;
        self.dynamic_priority = DEFAULT_PRIORITY;
        self.context = Context::zeroed();
        // A fresh process's first `swtch` into it must return somewhere
        // sane (§4.A): `forkret` releases the slot lock the scheduler
        // leaves held across the switch and runs the one-shot fsinit.
        #[cfg(not(test))]
        {
            self.context.ra = scheduler::forkret as usize;
        }
        // context.sp is left at 0 here: mapping a kernel stack is a
        // memory-manager concern this crate doesn't model (see `collab`),
        // so the kernel binary that owns the real `kstack` allocation is
        // expected to set it once the slot's address space is attached.
    }

    fn clear_for_free(&mut self) {
        *self = ProcInner::default();
    }
}

/// Fields that are either write-once at allocation time or touched only
/// by the process that owns the slot, plus the parent back-reference,
/// which `§3` calls out as guarded by the global `wait_lock` rather than
/// by the slot's own lock.
pub struct ProcData {
    pub name: String,
    pub address_space: Option<Box<dyn AddressSpace>>,
    pub trapframe: Option<Box<dyn TrapFrame>>,
    pub ofile: [Option<Arc<dyn FileHandle>>; NOFILE],
    pub cwd: Option<Arc<dyn Inode>>,
    pub tracemask: u32,
    pub parent: Option<Weak<Proc>>,
}

impl Default for ProcData {
    fn default() -> Self {
        Self {
            name: String::new(),
            address_space: None,
            trapframe: None,
            ofile: array![_ => None; NOFILE],
            cwd: None,
            tracemask: 0,
            parent: None,
        }
    }
}

/// One process-table slot. `inner` is the spinlock-protected scheduling
/// state; `data` is guarded in practice by a mix of "only the owner
/// touches it" and "only touched while `inner` is held during setup or
/// teardown" -- accessed through `&mut` obtained from an `UnsafeCell`
/// once the caller already holds `inner`'s guard, mirroring the split the
/// reference kernel makes between its `Mutex<ProcInner>` and its
/// lock-free `ProcData`.
pub struct Proc {
    pub inner: Mutex<ProcInner>,
    data: UnsafeCell<ProcData>,
}

unsafe impl Sync for Proc {}

impl Proc {
    fn new() -> Self {
        Self {
            inner: Mutex::new(ProcInner::default(), "proc"),
            data: UnsafeCell::new(ProcData::default()),
        }
    }

    #[cfg(test)]
    pub(crate) fn new_for_test() -> Self {
        Self::new()
    }

    /// Access to the lock-free fields. Callers must already hold (or be
    /// in the middle of establishing, e.g. during `allocproc`) this
    /// slot's `inner` lock, or be the process itself.
    #[allow(clippy::mut_from_ref)]
    pub fn data(&self) -> &mut ProcData {
        unsafe { &mut *self.data.get() }
    }
}

/// One hardware thread's scheduler-local state.
#[derive(Default)]
pub struct Cpu {
    current: Option<Arc<Proc>>,
    scheduler_context: Context,
    nesting: IntrNesting,
}

impl Cpu {
    pub fn nesting(&self) -> &IntrNesting {
        &self.nesting
    }

    pub fn current(&self) -> Option<Arc<Proc>> {
        self.current.clone()
    }

    pub fn set_current(&mut self, p: Option<Arc<Proc>>) {
        self.current = p;
    }

    pub fn scheduler_context_mut(&mut self) -> *mut Context {
        &mut self.scheduler_context as *mut _
    }
}

/// Per-CPU descriptors, indexed by `cpuid()`.
pub struct Cpus([UnsafeCell<Cpu>; NCPU]);

unsafe impl Sync for Cpus {}

impl Cpus {
    const fn new() -> Self {
        Self(array![_ => UnsafeCell::new(Cpu {
            current: None,
            scheduler_context: Context::zeroed(),
            nesting: IntrNesting::new(),
        }); NCPU])
    }

    #[allow(clippy::mut_from_ref)]
    pub fn my_cpu(&self) -> &mut Cpu {
        let id = crate::arch::cpuid();
        unsafe { &mut *self.0[id].get() }
    }

    pub fn my_proc(&self) -> Option<Arc<Proc>> {
        self.my_cpu().current.clone()
    }
}

pub static CPUS: Cpus = Cpus::new();

/// The process table plus the global locks and handles the design notes
/// describe as "global mutable state become fields of a single kernel
/// context value" (§9): `pid_lock` lives in [`pid`], `wait_lock` and
/// `initproc` live here, the tick counter lives in [`time`].
pub struct Procs {
    pool: [Arc<Proc>; NPROC],
    /// Guards every process's `data().parent` (§3, invariant 6: taken
    /// before any slot lock).
    pub wait_lock: Mutex<()>,
    initproc: Mutex<Option<Arc<Proc>>>,
    /// The filesystem collaborator, wired in by the kernel binary at boot
    /// and run exactly once by [`scheduler::forkret`].
    filesystem: Mutex<Option<Arc<dyn Filesystem>>>,
    /// The console collaborator, used only to report that a fatal
    /// invariant (such as a missing [`Filesystem`] wiring) has been hit.
    console: Mutex<Option<Arc<dyn Console>>>,
}

impl Procs {
    /// `pub` so tests (and nothing else -- there is exactly one kernel
    /// table in a real boot) can build an isolated instance instead of
    /// contending with the shared [`PROCS`] singleton.
    pub fn new() -> Self {
        Self {
            pool: array![_ => Arc::new(Proc::new()); NPROC],
            wait_lock: Mutex::new((), "wait_lock"),
            initproc: Mutex::new(None, "initproc"),
            filesystem: Mutex::new(None, "filesystem"),
            console: Mutex::new(None, "console"),
        }
    }

    pub fn slots(&self) -> &[Arc<Proc>; NPROC] {
        &self.pool
    }

    pub fn init_proc(&self) -> Arc<Proc> {
        self.initproc
            .lock()
            .clone()
            .expect("init_proc called before userinit")
    }

    pub(crate) fn set_init_proc(&self, p: Arc<Proc>) {
        *self.initproc.lock() = Some(p);
    }

    /// Wires the filesystem collaborator in. Called once by the kernel
    /// binary during boot, before the scheduler starts running anything.
    pub fn set_filesystem(&self, fs: Arc<dyn Filesystem>) {
        *self.filesystem.lock() = Some(fs);
    }

    pub(crate) fn filesystem(&self) -> Option<Arc<dyn Filesystem>> {
        self.filesystem.lock().clone()
    }

    /// Wires the console collaborator in, same timing as
    /// [`Procs::set_filesystem`].
    pub fn set_console(&self, console: Arc<dyn Console>) {
        *self.console.lock() = Some(console);
    }

    pub(crate) fn console(&self) -> Option<Arc<dyn Console>> {
        self.console.lock().clone()
    }

    /// Locates the slot for `pid`, returning a locked guard over its
    /// state. Linear scan, matching the reference kernel's own table
    /// walks.
    pub fn find_by_pid<'a>(&'a self, pid: Pid) -> Option<(Arc<Proc>, MutexGuard<'a, ProcInner>)> {
        for p in self.slots() {
            let guard = p.inner.lock();
            if guard.pid == pid && guard.state != State::Unused {
                return Some((p.clone(), guard));
            }
        }
        None
    }
}

pub static PROCS: SyncLazy<Procs> = SyncLazy::new(Procs::new);
