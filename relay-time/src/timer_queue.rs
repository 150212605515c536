//! A software timer queue for async executors.
//!
//! The queue owns its own clock. The clock only moves when [`TimerQueue::advance`] is called from
//! the tick interrupt, so a delay of `n` ticks requested at tick `t` is released exactly by the
//! `advance` that reaches `t + n`.

use crate::TimeoutError;

use core::cell::RefCell;
use core::cmp;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};

use critical_section::Mutex;
use heapless::Vec;

mod tick_type;
pub use tick_type::Ticks;

/// Holds a waker and at which time instant this waker shall be awoken.
struct WaitingWaker<T> {
    id: u32,
    release_at: T,
    waker: Waker,
}

struct Inner<T, const N: usize> {
    now: T,
    // Sorted by `release_at`, equal deadlines in insertion order.
    queue: Vec<WaitingWaker<T>, N>,
    next_id: u32,
}

impl<T: Ticks, const N: usize> Inner<T, N> {
    fn insert(&mut self, release_at: T, waker: &Waker) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let idx = self
            .queue
            .iter()
            .position(|w| w.release_at.compare(release_at) == cmp::Ordering::Greater)
            .unwrap_or(self.queue.len());

        let entry = WaitingWaker {
            id,
            release_at,
            waker: waker.clone(),
        };

        if self.queue.insert(idx, entry).is_err() {
            panic!("timer queue capacity of {} exceeded", N);
        }

        id
    }

    fn refresh(&mut self, id: u32, waker: &Waker) {
        if let Some(w) = self.queue.iter_mut().find(|w| w.id == id) {
            if !w.waker.will_wake(waker) {
                w.waker = waker.clone();
            }
        }
    }

    fn remove(&mut self, id: u32) {
        if let Some(idx) = self.queue.iter().position(|w| w.id == id) {
            self.queue.remove(idx);
        }
    }
}

/// A timer queue with room for `N` concurrent waits.
///
/// # Blocking
///
/// The internal priority queue uses global critical sections to manage access. Inserting or
/// removing an entry locks the system for O(N) time.
///
/// # Panics
///
/// Polling a `Delay` when `N` waits are already registered panics. The owner sizes `N` for the
/// worst case number of concurrent waits.
pub struct TimerQueue<T: Ticks, const N: usize> {
    inner: Mutex<RefCell<Inner<T, N>>>,
}

impl<T: Ticks, const N: usize> Default for TimerQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ticks, const N: usize> TimerQueue<T, N> {
    /// Make a new queue with the clock at zero.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                now: T::ZERO,
                queue: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// The current time.
    pub fn now(&self) -> T {
        critical_section::with(|cs| self.inner.borrow_ref(cs).now)
    }

    /// Number of registered waits.
    pub fn pending(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).queue.len())
    }

    /// Move the clock forward one tick and wake every wait that has expired.
    ///
    /// Call this from the tick interrupt. Returns the number of wakers woken.
    pub fn advance(&self) -> usize {
        let mut expired: Vec<Waker, N> = Vec::new();

        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.now = inner.now.wrapping_add(T::ONE_TICK);
            let now = inner.now;

            while inner
                .queue
                .first()
                .is_some_and(|head| now.is_at_least(head.release_at))
            {
                let head = inner.queue.remove(0);
                // Cannot overflow, `expired` has the capacity of the queue.
                let _ = expired.push(head.waker);
            }
        });

        let woken = expired.len();
        for waker in expired {
            waker.wake();
        }

        woken
    }

    /// Timeout at a specific time.
    pub fn timeout_at<F: Future>(&self, instant: T, future: F) -> Timeout<'_, T, N, F> {
        Timeout {
            delay: self.delay_until(instant),
            future,
        }
    }

    /// Timeout after a specific number of ticks.
    ///
    /// The wrapped future is polled before the deadline is checked, so a zero duration still
    /// gives it one chance to complete.
    #[inline]
    pub fn timeout_after<F: Future>(&self, duration: T, future: F) -> Timeout<'_, T, N, F> {
        let instant = self.now().wrapping_add(duration);
        self.timeout_at(instant, future)
    }

    /// Delay for a number of ticks. A zero delay is ready immediately.
    #[inline]
    pub fn delay(&self, duration: T) -> Delay<'_, T, N> {
        let instant = self.now().wrapping_add(duration);
        self.delay_until(instant)
    }

    /// Delay to some specific time instant.
    pub fn delay_until(&self, instant: T) -> Delay<'_, T, N> {
        Delay {
            queue: self,
            instant,
            id: None,
        }
    }

    /// Re-evaluate `condition` once per tick until it holds, for at most `timeout` ticks.
    ///
    /// The condition is checked immediately, then after every tick. It is given a last chance at
    /// the deadline before the wait fails.
    pub async fn poll_until<C>(&self, timeout: T, mut condition: C) -> Result<(), TimeoutError>
    where
        C: FnMut() -> bool,
    {
        let deadline = self.now().wrapping_add(timeout);

        loop {
            if condition() {
                return Ok(());
            }

            if self.now().is_at_least(deadline) {
                return Err(TimeoutError);
            }

            self.delay(T::ONE_TICK).await;
        }
    }
}

/// Future returned by `delay` and `delay_until`.
pub struct Delay<'q, T: Ticks, const N: usize> {
    queue: &'q TimerQueue<T, N>,
    instant: T,
    id: Option<u32>,
}

impl<T: Ticks, const N: usize> Delay<'_, T, N> {
    /// The instant this delay is released at.
    pub fn deadline(&self) -> T {
        self.instant
    }
}

impl<T: Ticks, const N: usize> Future for Delay<'_, T, N> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        critical_section::with(|cs| {
            let mut inner = this.queue.inner.borrow_ref_mut(cs);

            if inner.now.is_at_least(this.instant) {
                if let Some(id) = this.id.take() {
                    inner.remove(id);
                }
                return Poll::Ready(());
            }

            match this.id {
                Some(id) => inner.refresh(id, cx.waker()),
                None => this.id = Some(inner.insert(this.instant, cx.waker())),
            }

            Poll::Pending
        })
    }
}

impl<T: Ticks, const N: usize> Drop for Delay<'_, T, N> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            critical_section::with(|cs| self.queue.inner.borrow_ref_mut(cs).remove(id));
        }
    }
}

/// Future returned by `timeout_at` and `timeout_after`.
pub struct Timeout<'q, T: Ticks, const N: usize, F> {
    delay: Delay<'q, T, N>,
    future: F,
}

impl<T: Ticks, const N: usize, F: Future> Future for Timeout<'_, T, N, F> {
    type Output = Result<F::Output, TimeoutError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // SAFETY: `future` is never moved out of `self`, `delay` is `Unpin`.
        let inner = unsafe { self.get_unchecked_mut() };

        {
            // SAFETY: `inner` is pinned, so is its field.
            let f = unsafe { Pin::new_unchecked(&mut inner.future) };
            if let Poll::Ready(v) = f.poll(cx) {
                return Poll::Ready(Ok(v));
            }
        }

        if Pin::new(&mut inner.delay).poll(cx).is_ready() {
            return Poll::Ready(Err(TimeoutError));
        }

        Poll::Pending
    }
}
