//! Architecture glue: the handful of operations the process subsystem
//! needs from the hardware and from the trap layer. Everything here is a
//! thin wrapper in real (`not(test)`) builds and a host-side stand-in
//! under `cfg(test)`, so the scheduler and lifecycle code above never
//! branches on which one it is linked against.

#[cfg(not(test))]
mod hw {
    use riscv::register::sstatus;

    pub fn intr_on() {
        unsafe { sstatus::set_sie() }
    }

    pub fn intr_off() {
        unsafe { sstatus::clear_sie() }
    }

    pub fn intr_get() -> bool {
        sstatus::read().sie()
    }

    /// Current hart id, as recorded in `tp` by the boot trampoline.
    pub fn cpuid() -> usize {
        let id: usize;
        unsafe { core::arch::asm!("mv {}, tp", out(reg) id) }
        id
    }
}

#[cfg(test)]
mod hw {
    use core::cell::Cell;

    thread_local! {
        static SIE: Cell<bool> = Cell::new(true);
    }

    pub fn intr_on() {
        SIE.with(|s| s.set(true));
    }

    pub fn intr_off() {
        SIE.with(|s| s.set(false));
    }

    pub fn intr_get() -> bool {
        SIE.with(|s| s.get())
    }

    pub fn cpuid() -> usize {
        0
    }
}

pub use hw::{cpuid, intr_get, intr_off, intr_on};

/// Saved callee-saved register set exchanged by [`swtch`]. Field order is
/// dictated by the assembly trampoline in a real kernel; this crate only
/// ever treats it as an opaque blob it hands to `swtch`.
#[derive(Default)]
#[repr(C)]
pub struct Context {
    pub ra: usize,
    pub sp: usize,
    pub s0: usize,
    pub s1: usize,
    pub s2: usize,
    pub s3: usize,
    pub s4: usize,
    pub s5: usize,
    pub s6: usize,
    pub s7: usize,
    pub s8: usize,
    pub s9: usize,
    pub s10: usize,
    pub s11: usize,
}

impl Context {
    pub const fn zeroed() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        }
    }
}

/// Exchanges the currently running context for `to`, saving the caller's
/// live registers into `from`. Never implemented in terms of anything but
/// inline assembly on real hardware; under `cfg(test)` there is no real
/// register dance to perform since tests never run code past the point a
/// context switch would occur, so it is left undefined there.
#[cfg(not(test))]
pub unsafe fn swtch(from: *mut Context, to: *const Context) {
    extern "C" {
        fn swtch_asm(from: *mut Context, to: *const Context);
    }
    swtch_asm(from, to)
}
