//! Binary and counting semaphores with FIFO handoff.
//!
//! A `give` with waiters hands the unit straight to the oldest waiter without touching the
//! count, so a later [`Semaphore::try_take`] can never steal it. A binary semaphore coalesces
//! gives (signal semantic), a counting semaphore keeps every give up to its maximum.

use core::cell::Cell;
use core::fmt;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use critical_section::Mutex;
use relay_common::wait_queue::{Cancelled, Ticket, WaitQueue};

use crate::MAX_WAITERS;

/// The two flavours of semaphore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum SemaphoreKind {
    /// A single-slot signal. Giving an already given semaphore does nothing.
    Binary,
    /// A resource count. Every give is kept, up to `max`.
    Counting {
        /// Highest count the semaphore holds.
        max: u32,
    },
}

impl SemaphoreKind {
    const fn max(self) -> u32 {
        match self {
            SemaphoreKind::Binary => 1,
            SemaphoreKind::Counting { max } => max,
        }
    }
}

/// What a [`Semaphore::give`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum GiveOutcome {
    /// The unit was handed to the oldest waiter.
    Woke,
    /// Nobody was waiting, the count went up.
    Stored,
    /// A binary semaphore was already given.
    Coalesced,
    /// A counting semaphore was already at its maximum.
    Saturated,
}

/// A semaphore with room for `W` blocked takers.
///
/// `give` never blocks and never fails, so it can be called from interrupt context. Waking a
/// taker only marks it ready, the actual switch happens at the next dispatch point.
///
/// # Panics
///
/// Polling a [`Take`] when `W` takers are already blocked panics.
pub struct Semaphore<const W: usize = MAX_WAITERS> {
    kind: SemaphoreKind,
    count: Mutex<Cell<u32>>,
    waiters: WaitQueue<W>,
}

impl<const W: usize> Semaphore<W> {
    /// Create a semaphore of `kind` holding `initial` units, clamped to the kind's maximum.
    pub const fn new(kind: SemaphoreKind, initial: u32) -> Self {
        let max = kind.max();
        let initial = if initial > max { max } else { initial };

        Self {
            kind,
            count: Mutex::new(Cell::new(initial)),
            waiters: WaitQueue::new(),
        }
    }

    /// A binary semaphore, initially taken.
    pub const fn binary() -> Self {
        Self::new(SemaphoreKind::Binary, 0)
    }

    /// A counting semaphore.
    pub const fn counting(max: u32, initial: u32) -> Self {
        Self::new(SemaphoreKind::Counting { max }, initial)
    }

    /// The kind of this semaphore.
    pub fn kind(&self) -> SemaphoreKind {
        self.kind
    }

    /// Units currently available.
    pub fn count(&self) -> u32 {
        critical_section::with(|cs| self.count.borrow(cs).get())
    }

    /// Number of blocked takers.
    pub fn waiting(&self) -> usize {
        critical_section::with(|cs| self.waiters.waiting(cs))
    }

    /// Release one unit.
    ///
    /// A binary semaphore counts a unit handed to a waiter that has not run yet as given, so
    /// gives in between coalesce.
    pub fn give(&self) -> GiveOutcome {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            let current = count.get();

            if self.kind == SemaphoreKind::Binary
                && (current >= 1 || self.waiters.granted(cs) > 0)
            {
                return GiveOutcome::Coalesced;
            }

            if self.waiters.wake_one(cs) {
                return GiveOutcome::Woke;
            }

            match self.kind {
                SemaphoreKind::Counting { max } if current >= max => GiveOutcome::Saturated,
                _ => {
                    count.set(current + 1);
                    GiveOutcome::Stored
                }
            }
        })
    }

    /// Take a unit if one is available, non-blocking.
    pub fn try_take(&self) -> bool {
        critical_section::with(|cs| {
            let count = self.count.borrow(cs);
            match count.get() {
                0 => false,
                n => {
                    count.set(n - 1);
                    true
                }
            }
        })
    }

    /// Take a unit, waiting in FIFO order until one is given.
    ///
    /// Dropping the returned future gives back a unit that was already handed to it.
    pub fn take(&self) -> Take<'_, W> {
        Take {
            semaphore: self,
            ticket: None,
        }
    }
}

impl<const W: usize> fmt::Debug for Semaphore<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (count, waiting) =
            critical_section::with(|cs| (self.count.borrow(cs).get(), self.waiters.waiting(cs)));

        f.debug_struct("Semaphore")
            .field("kind", &self.kind)
            .field("count", &count)
            .field("waiting", &waiting)
            .finish()
    }
}

/// Future returned by [`Semaphore::take`].
pub struct Take<'a, const W: usize> {
    semaphore: &'a Semaphore<W>,
    ticket: Option<Ticket>,
}

impl<const W: usize> Future for Take<'_, W> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let sem = this.semaphore;

        critical_section::with(|cs| match this.ticket {
            None => {
                let count = sem.count.borrow(cs);
                if count.get() > 0 {
                    count.set(count.get() - 1);
                    return Poll::Ready(());
                }

                match sem.waiters.enqueue(cs, cx.waker()) {
                    Ok(ticket) => this.ticket = Some(ticket),
                    Err(_) => panic!("more than {} tasks blocked on one semaphore", W),
                }
                Poll::Pending
            }
            Some(ticket) => {
                if sem.waiters.take_grant(cs, ticket) {
                    this.ticket = None;
                    return Poll::Ready(());
                }

                sem.waiters.refresh(cs, ticket, cx.waker());
                Poll::Pending
            }
        })
    }
}

impl<const W: usize> Drop for Take<'_, W> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };

        let cancelled = critical_section::with(|cs| self.semaphore.waiters.cancel(cs, ticket));

        // The unit was granted but never consumed, pass it on.
        if cancelled == Cancelled::Granted {
            self.semaphore.give();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cassette::Cassette;
    use core::pin::pin;

    #[test]
    fn binary_give_is_idempotent() {
        let sem: Semaphore = Semaphore::binary();

        assert_eq!(sem.give(), GiveOutcome::Stored);
        assert_eq!(sem.give(), GiveOutcome::Coalesced);
        assert_eq!(sem.count(), 1);

        assert!(sem.try_take());
        assert!(!sem.try_take());
    }

    #[test]
    fn counting_keeps_every_give_up_to_max() {
        let sem: Semaphore = Semaphore::counting(3, 1);

        assert_eq!(sem.give(), GiveOutcome::Stored);
        assert_eq!(sem.give(), GiveOutcome::Stored);
        assert_eq!(sem.give(), GiveOutcome::Saturated);
        assert_eq!(sem.count(), 3);

        for _ in 0..3 {
            assert!(sem.try_take());
        }
        assert!(!sem.try_take());
    }

    #[test]
    fn initial_count_is_clamped() {
        let sem: Semaphore = Semaphore::new(SemaphoreKind::Binary, 5);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn give_hands_off_to_the_oldest_taker() {
        let sem: Semaphore = Semaphore::binary();

        let first = pin!(sem.take());
        let mut first = Cassette::new(first);
        let second = pin!(sem.take());
        let mut second = Cassette::new(second);

        assert!(first.poll_on().is_none());
        assert!(second.poll_on().is_none());
        assert_eq!(sem.waiting(), 2);

        assert_eq!(sem.give(), GiveOutcome::Woke);

        // The unit belongs to `first`, a bystander cannot steal it.
        assert!(!sem.try_take());
        assert!(second.poll_on().is_none());
        assert!(first.poll_on().is_some());

        assert_eq!(sem.give(), GiveOutcome::Woke);
        assert!(second.poll_on().is_some());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn binary_give_coalesces_while_a_grant_is_pending() {
        let sem: Semaphore = Semaphore::binary();

        let taker = pin!(sem.take());
        let mut taker = Cassette::new(taker);
        assert!(taker.poll_on().is_none());

        // Two signals before the taker runs count as one.
        assert_eq!(sem.give(), GiveOutcome::Woke);
        assert_eq!(sem.give(), GiveOutcome::Coalesced);
        assert_eq!(sem.count(), 0);

        assert!(taker.poll_on().is_some());
        assert!(!sem.try_take());

        // Once consumed, the next give is stored again.
        assert_eq!(sem.give(), GiveOutcome::Stored);
    }

    #[test]
    fn counting_give_wakes_every_waiter() {
        let sem: Semaphore = Semaphore::counting(2, 0);

        let first = pin!(sem.take());
        let mut first = Cassette::new(first);
        let second = pin!(sem.take());
        let mut second = Cassette::new(second);
        assert!(first.poll_on().is_none());
        assert!(second.poll_on().is_none());

        assert_eq!(sem.give(), GiveOutcome::Woke);
        assert_eq!(sem.give(), GiveOutcome::Woke);
        assert_eq!(sem.give(), GiveOutcome::Stored);

        assert!(first.poll_on().is_some());
        assert!(second.poll_on().is_some());
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn debug_shows_the_state() {
        let sem: Semaphore = Semaphore::counting(3, 2);
        assert_eq!(
            format!("{sem:?}"),
            "Semaphore { kind: Counting { max: 3 }, count: 2, waiting: 0 }"
        );
    }

    #[test]
    fn dropped_grant_is_passed_on() {
        let sem: Semaphore = Semaphore::binary();

        {
            let taker = pin!(sem.take());
            let mut taker = Cassette::new(taker);
            assert!(taker.poll_on().is_none());

            sem.give();
        }

        assert_eq!(sem.waiting(), 0);
        assert_eq!(sem.count(), 1);
    }

    #[test]
    fn dropped_waiter_leaves_the_queue() {
        let sem: Semaphore = Semaphore::binary();

        {
            let taker = pin!(sem.take());
            let mut taker = Cassette::new(taker);
            assert!(taker.poll_on().is_none());
        }

        assert_eq!(sem.waiting(), 0);
        assert_eq!(sem.give(), GiveOutcome::Stored);
    }
}
