//! A FIFO wait queue with direct handoff.
//!
//! Every waiter is identified by a [`Ticket`]. Waking a waiter removes it from the queue and
//! marks its ticket as *granted*: whatever the waiter was waiting for has been handed to it, so it
//! does not have to race other contenders for it when it is polled again.
//!
//! All operations take a [`CriticalSection`] token so that the owner of the queue can combine
//! queue manipulation with its own state in a single critical section.

use core::cell::RefCell;
use core::task::Waker;

use critical_section::{CriticalSection, Mutex};
use heapless::Vec;

/// Identifies one waiter in a [`WaitQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Ticket(u32);

/// Returned by [`WaitQueue::enqueue`] when every waiter slot is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct QueueFull;

/// The state a ticket was in when it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Cancelled {
    /// The waiter was still queued and has been removed.
    Waiting,
    /// The waiter had already been granted. The canceller now owns what was handed over and
    /// must pass it on.
    Granted,
    /// The ticket is unknown to this queue (already consumed).
    Unknown,
}

struct Waiter {
    ticket: Ticket,
    waker: Waker,
}

struct Inner<const N: usize> {
    waiting: Vec<Waiter, N>,
    granted: Vec<Ticket, N>,
    next: u32,
}

/// A FIFO of up to `N` waiters.
///
/// A ticket is either waiting or granted, never both, and the total of both never exceeds `N`.
pub struct WaitQueue<const N: usize> {
    inner: Mutex<RefCell<Inner<N>>>,
}

impl<const N: usize> Default for WaitQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> WaitQueue<N> {
    /// Create an empty wait queue.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                waiting: Vec::new(),
                granted: Vec::new(),
                next: 0,
            })),
        }
    }

    /// Put a waiter at the back of the queue.
    pub fn enqueue(&self, cs: CriticalSection<'_>, waker: &Waker) -> Result<Ticket, QueueFull> {
        let mut inner = self.inner.borrow_ref_mut(cs);

        if inner.waiting.len() + inner.granted.len() >= N {
            return Err(QueueFull);
        }

        let ticket = Ticket(inner.next);
        inner.next = inner.next.wrapping_add(1);
        inner
            .waiting
            .push(Waiter {
                ticket,
                waker: waker.clone(),
            })
            .map_err(|_| QueueFull)?;

        Ok(ticket)
    }

    /// Replace the waker of a queued ticket. Does nothing if the ticket is no longer waiting.
    pub fn refresh(&self, cs: CriticalSection<'_>, ticket: Ticket, waker: &Waker) {
        let mut inner = self.inner.borrow_ref_mut(cs);

        if let Some(waiter) = inner.waiting.iter_mut().find(|w| w.ticket == ticket) {
            if !waiter.waker.will_wake(waker) {
                waiter.waker = waker.clone();
            }
        }
    }

    /// Grant the first waiter in the queue and wake it.
    ///
    /// Returns `false` if nobody was waiting.
    pub fn wake_one(&self, cs: CriticalSection<'_>) -> bool {
        let waker = {
            let mut inner = self.inner.borrow_ref_mut(cs);
            if inner.waiting.is_empty() {
                return false;
            }

            let waiter = inner.waiting.remove(0);
            // Cannot fail: waiting and granted share the same `N` budget.
            let _ = inner.granted.push(waiter.ticket);
            waiter.waker
        };

        waker.wake();
        true
    }

    /// Grant and wake every waiter, in FIFO order. Returns how many were woken.
    pub fn wake_all(&self, cs: CriticalSection<'_>) -> usize {
        let mut woken = 0;
        while self.wake_one(cs) {
            woken += 1;
        }
        woken
    }

    /// Consume the grant of `ticket`. Returns `true` exactly once per granted ticket.
    pub fn take_grant(&self, cs: CriticalSection<'_>, ticket: Ticket) -> bool {
        let mut inner = self.inner.borrow_ref_mut(cs);

        match inner.granted.iter().position(|t| *t == ticket) {
            Some(idx) => {
                inner.granted.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Withdraw a ticket, wherever it is.
    pub fn cancel(&self, cs: CriticalSection<'_>, ticket: Ticket) -> Cancelled {
        let mut inner = self.inner.borrow_ref_mut(cs);

        if let Some(idx) = inner.waiting.iter().position(|w| w.ticket == ticket) {
            inner.waiting.remove(idx);
            return Cancelled::Waiting;
        }

        if let Some(idx) = inner.granted.iter().position(|t| *t == ticket) {
            inner.granted.swap_remove(idx);
            return Cancelled::Granted;
        }

        Cancelled::Unknown
    }

    /// Number of waiters that have not been granted yet.
    pub fn waiting(&self, cs: CriticalSection<'_>) -> usize {
        self.inner.borrow_ref(cs).waiting.len()
    }

    /// Number of granted tickets whose owners have not consumed the grant yet.
    pub fn granted(&self, cs: CriticalSection<'_>) -> usize {
        self.inner.borrow_ref(cs).granted.len()
    }
}
