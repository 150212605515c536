//! Task wakers.
//!
//! A task's waker points at the task's `woken` flag inside the kernel. Waking only sets the flag,
//! which is safe from any context, and the dispatcher turns it into a state change.

use core::task::{RawWaker, RawWakerVTable, Waker};

use portable_atomic::{AtomicBool, Ordering};

static WAKER_VTABLE: RawWakerVTable =
    RawWakerVTable::new(waker_clone, waker_wake, waker_wake, waker_drop);

unsafe fn waker_clone(p: *const ()) -> RawWaker {
    RawWaker::new(p, &WAKER_VTABLE)
}

unsafe fn waker_wake(p: *const ()) {
    // SAFETY: `p` was created from a `&'static AtomicBool` in `task_waker`.
    let flag = &*(p as *const AtomicBool);
    flag.store(true, Ordering::Release);
}

unsafe fn waker_drop(_: *const ()) {
    // nop
}

/// Build the waker that sets `flag`.
pub(crate) fn task_waker(flag: &'static AtomicBool) -> Waker {
    let raw = RawWaker::new(flag as *const AtomicBool as *const (), &WAKER_VTABLE);

    // SAFETY: the vtable functions only read through a pointer to a `'static` atomic.
    unsafe { Waker::from_raw(raw) }
}
