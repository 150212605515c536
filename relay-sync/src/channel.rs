//! An async aware MPSC channel that can be used on no-alloc systems.
//!
//! Every message sent is delivered exactly once and in order. Senders that find the queue full
//! wait in FIFO order, and the slot freed by a receive is reserved for the oldest of them.

use core::cell::{Cell, RefCell};
use core::future::{poll_fn, Future};
use core::pin::Pin;
use core::task::{Context, Poll};

#[doc(hidden)]
pub use critical_section;

use critical_section::{CriticalSection, Mutex};
use heapless::Deque;
use portable_atomic::{AtomicBool, Ordering};

use relay_common::wait_queue::{Cancelled, Ticket, WaitQueue};
use relay_common::waker_registration::CriticalSectionWakerRegistration as WakerRegistration;

use crate::MAX_WAITERS;

/// An MPSC channel for use in no-alloc systems. `N` sets the size of the queue.
pub struct Channel<T, const N: usize> {
    queue: Mutex<RefCell<Deque<T, N>>>,
    // Free slots promised to senders that were granted but have not pushed yet.
    reserved: Mutex<Cell<usize>>,
    // Waker for the receiver.
    receiver_waker: WakerRegistration,
    wait_queue: WaitQueue<MAX_WAITERS>,
    receiver_dropped: Mutex<Cell<bool>>,
    num_senders: Mutex<Cell<usize>>,
    split: AtomicBool,
}

/// Returned by [`Channel::split`] when the channel was already split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct AlreadySplit;

impl<T, const N: usize> Default for Channel<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Channel<T, N> {
    /// Create a new channel.
    pub const fn new() -> Self {
        Self {
            queue: Mutex::new(RefCell::new(Deque::new())),
            reserved: Mutex::new(Cell::new(0)),
            receiver_waker: WakerRegistration::new(),
            wait_queue: WaitQueue::new(),
            receiver_dropped: Mutex::new(Cell::new(false)),
            num_senders: Mutex::new(Cell::new(0)),
            split: AtomicBool::new(false),
        }
    }

    /// Split the channel into a `Sender`/`Receiver` pair. This can only be done once.
    pub fn split(&self) -> Result<(Sender<'_, T, N>, Receiver<'_, T, N>), AlreadySplit> {
        if self.split.swap(true, Ordering::AcqRel) {
            return Err(AlreadySplit);
        }

        critical_section::with(|cs| self.num_senders.borrow(cs).set(1));

        Ok((Sender(self), Receiver(self)))
    }

    fn has_room(&self, cs: CriticalSection<'_>) -> bool {
        self.queue.borrow_ref(cs).len() + self.reserved.borrow(cs).get() < N
    }

    fn push(&self, cs: CriticalSection<'_>, val: T) {
        // Room was checked or reserved in the same critical section.
        if self.queue.borrow_ref_mut(cs).push_back(val).is_err() {
            unreachable!("channel slot accounting is broken");
        }
    }

    fn is_receiver_dropped(&self, cs: CriticalSection<'_>) -> bool {
        self.receiver_dropped.borrow(cs).get()
    }

    /// Give a reserved slot to the next waiting sender, or release it.
    fn pass_on_reservation(&self, cs: CriticalSection<'_>) {
        if !self.wait_queue.wake_one(cs) {
            let reserved = self.reserved.borrow(cs);
            reserved.set(reserved.get() - 1);
        }
    }
}

/// Creates a split channel with `'static` lifetime.
#[macro_export]
macro_rules! make_channel {
    ($type:ty, $size:expr) => {{
        static CHANNEL: $crate::channel::Channel<$type, $size> = $crate::channel::Channel::new();

        match CHANNEL.split() {
            Ok(pair) => pair,
            Err(_) => panic!("call to the same `make_channel` instance twice"),
        }
    }};
}

// -------- Sender

/// The `Receiver` is gone.
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct NoReceiver<T>(pub T);

/// Errors that 'try_send` can have.
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum TrySendError<T> {
    /// The `Receiver` is gone.
    NoReceiver(T),
    /// No room left.
    Full(T),
}

impl<T> core::fmt::Debug for NoReceiver<T>
where
    T: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "NoReceiver({:?})", self.0)
    }
}

impl<T> core::fmt::Display for NoReceiver<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("the receiver was dropped")
    }
}

impl<T> core::fmt::Debug for TrySendError<T>
where
    T: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TrySendError::NoReceiver(v) => write!(f, "NoReceiver({v:?})"),
            TrySendError::Full(v) => write!(f, "Full({v:?})"),
        }
    }
}

impl<T> core::fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TrySendError::NoReceiver(_) => f.write_str("the receiver was dropped"),
            TrySendError::Full(_) => f.write_str("the channel is full"),
        }
    }
}

impl<T> PartialEq for TrySendError<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TrySendError::NoReceiver(v1), TrySendError::NoReceiver(v2)) => v1.eq(v2),
            (TrySendError::Full(v1), TrySendError::Full(v2)) => v1.eq(v2),
            _ => false,
        }
    }
}

/// A `Sender` can send to the channel and can be cloned.
pub struct Sender<'a, T, const N: usize>(&'a Channel<T, N>);

impl<T, const N: usize> core::fmt::Debug for Sender<'_, T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Sender")
    }
}

#[cfg(feature = "defmt-03")]
impl<T, const N: usize> defmt::Format for Sender<'_, T, N> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Sender",)
    }
}

impl<'a, T, const N: usize> Sender<'a, T, N> {
    /// Queue a value without waiting.
    pub fn try_send(&mut self, val: T) -> Result<(), TrySendError<T>> {
        let chan = self.0;

        critical_section::with(|cs| {
            if chan.is_receiver_dropped(cs) {
                return Err(TrySendError::NoReceiver(val));
            }

            // Waiting senders go first.
            if chan.wait_queue.waiting(cs) > 0 || !chan.has_room(cs) {
                return Err(TrySendError::Full(val));
            }

            chan.push(cs, val);
            Ok(())
        })?;

        chan.receiver_waker.wake();
        Ok(())
    }

    /// Queue a value, waiting for room. Blocked senders are served in arrival order.
    /// Fails once the receiver is gone.
    pub fn send(&mut self, val: T) -> SendFuture<'_, 'a, T, N> {
        SendFuture {
            sender: self,
            value: Some(val),
            ticket: None,
        }
    }

    /// The receiver is gone.
    pub fn is_closed(&self) -> bool {
        critical_section::with(|cs| self.0.is_receiver_dropped(cs))
    }

    /// Is the queue full.
    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| !self.0.has_room(cs))
    }

    /// Is the queue empty.
    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.0.queue.borrow_ref(cs).is_empty())
    }
}

impl<T, const N: usize> Drop for Sender<'_, T, N> {
    fn drop(&mut self) {
        let num_senders = critical_section::with(|cs| {
            let senders = self.0.num_senders.borrow(cs);
            senders.set(senders.get() - 1);
            senders.get()
        });

        // The last sender wakes the receiver so it sees `NoSender`.
        if num_senders == 0 {
            self.0.receiver_waker.wake();
        }
    }
}

impl<T, const N: usize> Clone for Sender<'_, T, N> {
    fn clone(&self) -> Self {
        critical_section::with(|cs| {
            let senders = self.0.num_senders.borrow(cs);
            senders.set(senders.get() + 1);
        });

        Self(self.0)
    }
}

/// Future returned by [`Sender::send`].
pub struct SendFuture<'s, 'a, T, const N: usize> {
    sender: &'s mut Sender<'a, T, N>,
    value: Option<T>,
    ticket: Option<Ticket>,
}

// The value is moved in and out, never pinned.
impl<T, const N: usize> Unpin for SendFuture<'_, '_, T, N> {}

impl<T, const N: usize> Future for SendFuture<'_, '_, T, N> {
    type Output = Result<(), NoReceiver<T>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let chan = this.sender.0;

        let Some(val) = this.value.take() else {
            panic!("`SendFuture` polled after completion");
        };

        let outcome = critical_section::with(|cs| {
            if chan.is_receiver_dropped(cs) {
                if let Some(ticket) = this.ticket.take() {
                    chan.wait_queue.cancel(cs, ticket);
                }
                return Poll::Ready(Err(NoReceiver(val)));
            }

            match this.ticket {
                None if chan.wait_queue.waiting(cs) == 0 && chan.has_room(cs) => {
                    chan.push(cs, val);
                    Poll::Ready(Ok(()))
                }
                None => match chan.wait_queue.enqueue(cs, cx.waker()) {
                    Ok(ticket) => {
                        this.ticket = Some(ticket);
                        this.value = Some(val);
                        Poll::Pending
                    }
                    Err(_) => panic!("more than {} senders blocked on one channel", MAX_WAITERS),
                },
                Some(ticket) if chan.wait_queue.take_grant(cs, ticket) => {
                    this.ticket = None;
                    let reserved = chan.reserved.borrow(cs);
                    reserved.set(reserved.get() - 1);
                    chan.push(cs, val);
                    Poll::Ready(Ok(()))
                }
                Some(ticket) => {
                    chan.wait_queue.refresh(cs, ticket, cx.waker());
                    this.value = Some(val);
                    Poll::Pending
                }
            }
        });

        if let Poll::Ready(Ok(())) = outcome {
            chan.receiver_waker.wake();
        }

        outcome
    }
}

impl<T, const N: usize> Drop for SendFuture<'_, '_, T, N> {
    fn drop(&mut self) {
        let Some(ticket) = self.ticket.take() else {
            return;
        };

        let chan = self.sender.0;
        critical_section::with(|cs| {
            if chan.wait_queue.cancel(cs, ticket) == Cancelled::Granted {
                chan.pass_on_reservation(cs);
            }
        });
    }
}

// -------- Receiver

/// A receiver of the channel. There can only be one receiver at any time.
pub struct Receiver<'a, T, const N: usize>(&'a Channel<T, N>);

impl<T, const N: usize> core::fmt::Debug for Receiver<'_, T, N> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Receiver")
    }
}

#[cfg(feature = "defmt-03")]
impl<T, const N: usize> defmt::Format for Receiver<'_, T, N> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "Receiver",)
    }
}

/// Possible receive errors.
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ReceiveError {
    /// Every `Sender` is gone.
    NoSender,
    /// Nothing is queued.
    Empty,
}

impl core::fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReceiveError::NoSender => f.write_str("all senders were dropped"),
            ReceiveError::Empty => f.write_str("the channel is empty"),
        }
    }
}

impl<T, const N: usize> Receiver<'_, T, N> {
    /// Take the oldest queued value without waiting.
    pub fn try_recv(&mut self) -> Result<T, ReceiveError> {
        let chan = self.0;

        critical_section::with(|cs| {
            let popped = chan.queue.borrow_ref_mut(cs).pop_front();

            match popped {
                Some(val) => {
                    // Reserve the freed slot for the oldest waiting sender.
                    if chan.wait_queue.wake_one(cs) {
                        let reserved = chan.reserved.borrow(cs);
                        reserved.set(reserved.get() + 1);
                    }
                    Ok(val)
                }
                None if chan.num_senders.borrow(cs).get() == 0 => Err(ReceiveError::NoSender),
                None => Err(ReceiveError::Empty),
            }
        })
    }

    /// Take the oldest queued value, waiting for one if the queue is empty.
    /// Fails with `NoSender` once every sender is gone and the queue is drained.
    pub async fn recv(&mut self) -> Result<T, ReceiveError> {
        poll_fn(|cx| {
            // Register first so a send racing the check below still wakes us.
            self.0.receiver_waker.register(cx.waker());

            match self.try_recv() {
                Ok(val) => Poll::Ready(Ok(val)),
                Err(ReceiveError::NoSender) => Poll::Ready(Err(ReceiveError::NoSender)),
                Err(ReceiveError::Empty) => Poll::Pending,
            }
        })
        .await
    }

    /// Every sender is gone.
    pub fn is_closed(&self) -> bool {
        critical_section::with(|cs| self.0.num_senders.borrow(cs).get() == 0)
    }

    /// Is the queue full.
    pub fn is_full(&self) -> bool {
        critical_section::with(|cs| self.0.queue.borrow_ref(cs).is_full())
    }

    /// Is the queue empty.
    pub fn is_empty(&self) -> bool {
        critical_section::with(|cs| self.0.queue.borrow_ref(cs).is_empty())
    }

    /// Number of messages waiting to be received.
    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.0.queue.borrow_ref(cs).len())
    }
}

impl<T, const N: usize> Drop for Receiver<'_, T, N> {
    fn drop(&mut self) {
        // Blocked senders observe `NoReceiver`.
        critical_section::with(|cs| {
            self.0.receiver_dropped.borrow(cs).set(true);
            self.0.wait_queue.wake_all(cs);
        });
    }
}
