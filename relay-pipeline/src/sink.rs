//! The task that owns the transport.
//!
//! Workers never write to the transport themselves. The sink takes one message at a time from
//! the queue or the mailbox and writes it out whole, so lines on the wire never interleave.

use log::{error, info};
use portable_atomic::{AtomicU32, Ordering};
use relay::sync::channel::Receiver;
use relay::Kernel;

use crate::config::QUEUE_DEPTH;
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::transport::Transport;

/// Written once when the sink starts.
pub const BANNER: &str = "Relay multi-peripheral demo\r\n";

/// Where the sink takes messages from.
pub enum Inbox {
    /// The receiving end of the message queue.
    Queue(Receiver<'static, Message, QUEUE_DEPTH>),
    /// The mailbox, released after every transmission.
    Mailbox(&'static Mailbox),
}

/// Counters of the sink.
#[derive(Debug, Default)]
pub struct SinkCounters {
    sent: AtomicU32,
    failed: AtomicU32,
    bytes: AtomicU32,
}

/// Snapshot of [`SinkCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Messages written out.
    pub sent: u32,
    /// Messages lost to transport errors.
    pub failed: u32,
    /// Bytes written, banner included.
    pub bytes: u32,
}

impl SinkCounters {
    /// All zero.
    pub const fn new() -> Self {
        Self {
            sent: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            bytes: AtomicU32::new(0),
        }
    }

    /// Read all counters.
    pub fn stats(&self) -> SinkStats {
        SinkStats {
            sent: self.sent.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            bytes: self.bytes.load(Ordering::Acquire),
        }
    }
}

/// The sink task.
pub struct Sink<T> {
    /// The kernel the sink runs on.
    pub kernel: &'static Kernel,
    /// Where messages come from.
    pub inbox: Inbox,
    /// Where messages go.
    pub transport: T,
    /// Where the sink counts.
    pub counters: &'static SinkCounters,
}

impl<T: Transport> Sink<T> {
    /// Write the banner, then serve messages until every producer is gone.
    pub async fn run(mut self) {
        if self.write(BANNER.as_bytes()) {
            info!("sink ready");
        }

        loop {
            let msg = match &mut self.inbox {
                Inbox::Queue(receiver) => match receiver.recv().await {
                    Ok(msg) => msg,
                    Err(_) => {
                        info!("all producers are gone, sink stops");
                        return;
                    }
                },
                Inbox::Mailbox(mailbox) => mailbox.receive(self.kernel).await,
            };

            let counter = if self.write(msg.as_bytes()) {
                &self.counters.sent
            } else {
                &self.counters.failed
            };
            counter.fetch_add(1, Ordering::AcqRel);

            if let Inbox::Mailbox(mailbox) = &self.inbox {
                mailbox.release();
            }
        }
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        match self.transport.write_bytes(bytes) {
            Ok(()) => {
                let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
                self.counters.bytes.fetch_add(len, Ordering::AcqRel);
                true
            }
            Err(e) => {
                error!("transport write failed, {} bytes lost: {}", bytes.len(), e);
                false
            }
        }
    }
}
