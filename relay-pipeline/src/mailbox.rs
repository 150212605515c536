//! A single-slot handoff buffer.
//!
//! The slot is guarded by two binary semaphores. `free` is held by one producer from the moment
//! it starts formatting until the sink has transmitted the message, so no other producer can
//! touch the slot in between. `full` tells the sink that the slot holds a message.

use core::cell::RefCell;

use critical_section::Mutex;
use relay::{Kernel, Semaphore, TimeoutError, Wait};

use crate::message::Message;

/// One message in flight between a producer and the sink.
pub struct Mailbox {
    slot: Mutex<RefCell<Option<Message>>>,
    free: Semaphore,
    full: Semaphore,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    /// An empty mailbox.
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
            free: Semaphore::new(relay::SemaphoreKind::Binary, 1),
            full: Semaphore::binary(),
        }
    }

    /// Claim the slot, waiting at most `wait`. The claim lasts until the sink released the
    /// posted message, or until the reservation is dropped without posting.
    pub async fn reserve(
        &self,
        kernel: &Kernel,
        wait: Wait,
    ) -> Result<Reservation<'_>, TimeoutError> {
        kernel.take(&self.free, wait).await?;
        Ok(Reservation {
            mailbox: self,
            posted: false,
        })
    }

    /// Wait for a posted message.
    pub async fn receive(&self, kernel: &Kernel) -> Message {
        loop {
            if kernel.take(&self.full, Wait::Forever).await.is_err() {
                continue;
            }

            if let Some(msg) = critical_section::with(|cs| self.slot.borrow_ref_mut(cs).take()) {
                return msg;
            }
        }
    }

    /// Hand the slot back after the received message was transmitted.
    pub fn release(&self) {
        self.free.give();
    }

    /// Check if a producer holds the slot.
    pub fn is_claimed(&self) -> bool {
        self.free.count() == 0
    }
}

/// A claim on the mailbox slot.
pub struct Reservation<'a> {
    mailbox: &'a Mailbox,
    posted: bool,
}

impl Reservation<'_> {
    /// Put `msg` in the slot and wake the sink. The slot stays claimed until the sink releases
    /// it.
    pub fn post(mut self, msg: Message) {
        critical_section::with(|cs| {
            self.mailbox.slot.borrow_ref_mut(cs).replace(msg);
        });
        self.posted = true;
        self.mailbox.full.give();
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.posted {
            self.mailbox.free.give();
        }
    }
}
