//! A minimal one-shot lazy initializer for `static` values that need heap
//! allocation (an `Arc` pool, for instance) and therefore cannot be built
//! by a `const fn`. Double-checked against a state flag rather than a
//! full mutex, since initialization happens once, early, before any
//! scheduler loop is running and contention is not a concern.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

pub struct SyncLazy<T, F = fn() -> T> {
    state: AtomicU8,
    init: UnsafeCell<Option<F>>,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send + Sync, F: Send> Sync for SyncLazy<T, F> {}

impl<T, F: FnOnce() -> T> SyncLazy<T, F> {
    pub const fn new(init: F) -> Self {
        Self {
            state: AtomicU8::new(UNINIT),
            init: UnsafeCell::new(Some(init)),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    fn force(&self) -> &T {
        loop {
            match self.state.compare_exchange(
                UNINIT,
                INITIALIZING,
                Ordering::Acquire,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    let f = unsafe { (*self.init.get()).take() }
                        .expect("SyncLazy initializer ran twice");
                    let v = f();
                    unsafe { (*self.value.get()).write(v) };
                    self.state.store(READY, Ordering::Release);
                }
                Err(READY) => break,
                Err(INITIALIZING) => core::hint::spin_loop(),
                Err(_) => unreachable!(),
            }
        }
        unsafe { (*self.value.get()).assume_init_ref() }
    }
}

impl<T, F: FnOnce() -> T> core::ops::Deref for SyncLazy<T, F> {
    type Target = T;
    fn deref(&self) -> &T {
        self.force()
    }
}
