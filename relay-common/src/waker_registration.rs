//! Single-waker registration.

use core::cell::RefCell;
use core::task::Waker;

use critical_section::Mutex;

/// Holds at most one waker, for a resource with exactly one consumer.
pub struct CriticalSectionWakerRegistration {
    waker: Mutex<RefCell<Option<Waker>>>,
}

impl Default for CriticalSectionWakerRegistration {
    fn default() -> Self {
        Self::new()
    }
}

impl CriticalSectionWakerRegistration {
    /// Create an empty registration.
    pub const fn new() -> Self {
        Self {
            waker: Mutex::new(RefCell::new(None)),
        }
    }

    /// Register a waker, replacing the previous one.
    ///
    /// A replaced waker belonging to a different task is woken so that task can re-register if
    /// it is still interested.
    pub fn register(&self, new_waker: &Waker) {
        let displaced = critical_section::with(|cs| {
            let mut slot = self.waker.borrow_ref_mut(cs);
            match slot.as_ref() {
                Some(w) if w.will_wake(new_waker) => None,
                _ => slot.replace(new_waker.clone()),
            }
        });

        if let Some(old) = displaced {
            old.wake();
        }
    }

    /// Wake and clear the registered waker, if any.
    pub fn wake(&self) {
        let waker = critical_section::with(|cs| self.waker.borrow_ref_mut(cs).take());

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    /// Check if a waker is registered.
    pub fn is_registered(&self) -> bool {
        critical_section::with(|cs| self.waker.borrow_ref(cs).is_some())
    }
}
