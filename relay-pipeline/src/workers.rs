//! Producer tasks.
//!
//! Every worker runs the same loop: wait for its activation, let its [`Job`] format one message
//! and hand the message to the sink. All waits are bounded, so a stuck sink or a silent
//! interrupt costs a worker one cycle, never the system.

use core::fmt::Write;

use embedded_hal::digital::StatefulOutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::{Error as _, SpiBus};
use log::{debug, warn};
use portable_atomic::{AtomicU32, Ordering};
use relay::sync::channel::{NoReceiver, Sender};
use relay::sync::{Reading, SampleReader};
use relay::time::poll::spin_until;
use relay::{Kernel, Semaphore, Wait};

use crate::config::QUEUE_DEPTH;
use crate::error::JobError;
use crate::mailbox::Mailbox;
use crate::message::{Message, Tag};
use crate::source::{percent, SampleSource, FULL_SCALE};

/// Byte shifted out by the SPI job.
pub const SPI_PROBE: u8 = 0x55;

/// One unit of work: read a peripheral and describe the result.
pub trait Job {
    /// Tag of the produced messages.
    fn tag(&self) -> Tag;

    /// Append the message text. The tag and the line ending are written by the worker.
    fn run(&mut self, msg: &mut Message) -> Result<(), JobError>;
}

/// What makes a worker run.
#[derive(Debug, Clone, Copy)]
pub enum Activation {
    /// Every `period` ticks, starting right away.
    Periodic {
        /// Ticks between two activations.
        period: u32,
    },
    /// When `semaphore` is given, waiting at most `timeout` ticks each time.
    Signal {
        /// Given once per unit of upstream data.
        semaphore: &'static Semaphore,
        /// Ticks without a signal before the wait is logged and restarted.
        timeout: u32,
    },
}

/// Where a worker puts its messages.
pub enum Handoff {
    /// The sink's queue.
    Queue(Sender<'static, Message, QUEUE_DEPTH>),
    /// The sink's single-slot mailbox.
    Mailbox(&'static Mailbox),
}

/// Counters of one worker, shared with whoever inspects the system.
#[derive(Debug, Default)]
pub struct WorkerCounters {
    activations: AtomicU32,
    sent: AtomicU32,
    failed: AtomicU32,
    skipped: AtomicU32,
    dropped: AtomicU32,
    missed_signals: AtomicU32,
}

/// Snapshot of [`WorkerCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Cycles started.
    pub activations: u32,
    /// Messages accepted by the sink side.
    pub sent: u32,
    /// Cycles where the job failed.
    pub failed: u32,
    /// Cycles with nothing new to report.
    pub skipped: u32,
    /// Messages given up because the sink did not accept them in time.
    pub dropped: u32,
    /// Signal waits that timed out.
    pub missed_signals: u32,
}

impl WorkerCounters {
    /// All zero.
    pub const fn new() -> Self {
        Self {
            activations: AtomicU32::new(0),
            sent: AtomicU32::new(0),
            failed: AtomicU32::new(0),
            skipped: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
            missed_signals: AtomicU32::new(0),
        }
    }

    /// Read all counters.
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            activations: self.activations.load(Ordering::Acquire),
            sent: self.sent.load(Ordering::Acquire),
            failed: self.failed.load(Ordering::Acquire),
            skipped: self.skipped.load(Ordering::Acquire),
            dropped: self.dropped.load(Ordering::Acquire),
            missed_signals: self.missed_signals.load(Ordering::Acquire),
        }
    }

    fn bump(counter: &AtomicU32) {
        counter.fetch_add(1, Ordering::AcqRel);
    }

    fn count_failure(&self, tag: &str, error: JobError) {
        if let JobError::NothingNew = error {
            Self::bump(&self.skipped);
            debug!("{tag}: nothing new, cycle skipped");
        } else {
            Self::bump(&self.failed);
            warn!("{tag}: cycle skipped: {error}");
        }
    }
}

/// A producer task.
pub struct Worker<J> {
    /// The kernel the worker runs on.
    pub kernel: &'static Kernel,
    /// What the worker does each cycle.
    pub job: J,
    /// When the worker runs.
    pub activation: Activation,
    /// Where messages go.
    pub handoff: Handoff,
    /// Ticks to wait for the sink before dropping a message.
    pub handoff_timeout: u32,
    /// Where the worker counts.
    pub counters: &'static WorkerCounters,
}

impl<J: Job> Worker<J> {
    /// The worker loop. Never returns.
    pub async fn run(mut self) {
        let mut next = self.kernel.now();

        loop {
            match self.activation {
                Activation::Periodic { .. } => {}
                Activation::Signal { semaphore, timeout } => {
                    // A zero timeout would never suspend.
                    let wait = Wait::Ticks(timeout.max(1));
                    if self.kernel.take(semaphore, wait).await.is_err() {
                        WorkerCounters::bump(&self.counters.missed_signals);
                        debug!("{}: no signal within {} ticks", self.job.tag().name(), timeout);
                        continue;
                    }
                }
            }

            self.cycle().await;

            if let Activation::Periodic { period } = self.activation {
                next = next.wrapping_add(period.max(1));
                self.kernel.delay_until(next).await;
            }
        }
    }

    async fn cycle(&mut self) {
        WorkerCounters::bump(&self.counters.activations);
        let tag = self.job.tag().name();

        match &mut self.handoff {
            Handoff::Queue(sender) => {
                let mut msg = Message::new();
                if let Err(e) = compose(&mut self.job, &mut msg) {
                    self.counters.count_failure(tag, e);
                    return;
                }

                match self
                    .kernel
                    .timeout_after(self.handoff_timeout, sender.send(msg))
                    .await
                {
                    Ok(Ok(())) => WorkerCounters::bump(&self.counters.sent),
                    Ok(Err(NoReceiver(_))) => {
                        WorkerCounters::bump(&self.counters.dropped);
                        warn!("{tag}: message dropped, the sink is gone");
                    }
                    Err(_) => {
                        WorkerCounters::bump(&self.counters.dropped);
                        warn!(
                            "{tag}: message dropped, queue full for {} ticks",
                            self.handoff_timeout
                        );
                    }
                }
            }
            Handoff::Mailbox(mailbox) => {
                // The slot stays claimed from here until the sink has transmitted.
                let wait = Wait::Ticks(self.handoff_timeout);
                let Ok(reservation) = mailbox.reserve(self.kernel, wait).await else {
                    WorkerCounters::bump(&self.counters.dropped);
                    warn!(
                        "{tag}: message dropped, mailbox busy for {} ticks",
                        self.handoff_timeout
                    );
                    return;
                };

                let mut msg = Message::new();
                match compose(&mut self.job, &mut msg) {
                    Ok(()) => {
                        reservation.post(msg);
                        WorkerCounters::bump(&self.counters.sent);
                    }
                    // Dropping the reservation frees the slot.
                    Err(e) => self.counters.count_failure(tag, e),
                }
            }
        }
    }
}

fn compose<J: Job>(job: &mut J, msg: &mut Message) -> Result<(), JobError> {
    msg.begin(job.tag())?;
    job.run(msg)?;
    msg.finish()?;
    Ok(())
}

fn write_sample(msg: &mut Message, raw: u16) -> Result<(), JobError> {
    write!(msg, "Raw={}  %={}", raw, percent(raw))?;
    Ok(())
}

/// Reports the latest sample delivered by the interrupt handoff.
pub struct AdcJob {
    reader: SampleReader<'static>,
    every_sample: bool,
}

impl AdcJob {
    /// Report whatever sample is current when the job runs. Samples published in between are
    /// expected to be skipped.
    pub fn latest(reader: SampleReader<'static>) -> Self {
        Self {
            reader,
            every_sample: false,
        }
    }

    /// Report every sample once. Skipped samples are overruns and logged, and a run without a
    /// new sample produces no message.
    pub fn every_sample(reader: SampleReader<'static>) -> Self {
        Self {
            reader,
            every_sample: true,
        }
    }

    /// Samples this job never reported.
    pub fn overruns(&self) -> u32 {
        self.reader.overruns()
    }
}

impl Job for AdcJob {
    fn tag(&self) -> Tag {
        Tag::Adc
    }

    fn run(&mut self, msg: &mut Message) -> Result<(), JobError> {
        match self.reader.read() {
            Reading::Empty => msg.push_str("No sample")?,
            Reading::Stale(_) if self.every_sample => return Err(JobError::NothingNew),
            Reading::Stale(raw) => write_sample(msg, raw)?,
            Reading::Fresh { value, missed } => {
                if missed > 0 && self.every_sample {
                    warn!("ADC overrun, {missed} samples overwritten");
                } else if missed > 0 {
                    debug!("ADC skipped {missed} samples");
                }
                write_sample(msg, value)?;
            }
        }
        Ok(())
    }
}

/// Starts a conversion and polls for its completion.
pub struct PolledAdcJob<S: 'static> {
    source: &'static S,
    budget: u32,
}

impl<S: SampleSource> PolledAdcJob<S> {
    /// Poll the end-of-conversion flag at most `budget` times.
    pub const fn new(source: &'static S, budget: u32) -> Self {
        Self { source, budget }
    }
}

impl<S: SampleSource> Job for PolledAdcJob<S> {
    fn tag(&self) -> Tag {
        Tag::Adc
    }

    fn run(&mut self, msg: &mut Message) -> Result<(), JobError> {
        let source = self.source;
        source.start_conversion();

        match spin_until(self.budget, || source.end_of_conversion()) {
            Ok(_) => {
                let raw = source.read_data().min(FULL_SCALE);
                source.clear_end_of_conversion();
                write_sample(msg, raw)?;
            }
            Err(_) => {
                debug!("conversion not done after {} polls", self.budget);
                msg.push_str("Timeout")?;
            }
        }
        Ok(())
    }
}

/// Exchanges one byte with an SPI device.
pub struct SpiJob<B> {
    bus: B,
}

impl<B: SpiBus<u8>> SpiJob<B> {
    /// Probe the device on `bus`.
    pub const fn new(bus: B) -> Self {
        Self { bus }
    }
}

impl<B: SpiBus<u8>> Job for SpiJob<B> {
    fn tag(&self) -> Tag {
        Tag::Spi
    }

    fn run(&mut self, msg: &mut Message) -> Result<(), JobError> {
        let mut frame = [SPI_PROBE];

        match self.bus.transfer_in_place(&mut frame) {
            Ok(()) => write!(msg, "RX=0x{:02X}", frame[0])?,
            Err(e) => {
                debug!("SPI transfer failed: {:?}", e.kind());
                msg.push_str("Error")?;
            }
        }
        Ok(())
    }
}

/// Checks that a device answers on an I2C bus.
pub struct I2cJob<I> {
    bus: I,
    address: u8,
}

impl<I: I2c> I2cJob<I> {
    /// Probe `address` on `bus`.
    pub const fn new(bus: I, address: u8) -> Self {
        Self { bus, address }
    }
}

impl<I: I2c> Job for I2cJob<I> {
    fn tag(&self) -> Tag {
        Tag::I2c
    }

    fn run(&mut self, msg: &mut Message) -> Result<(), JobError> {
        if self.bus.write(self.address, &[]).is_ok() {
            msg.push_str("Bus Active")?;
        } else {
            msg.push_str("No Ack")?;
        }
        Ok(())
    }
}

/// Toggle `pin` every `period` ticks. Produces no messages.
pub async fn heartbeat<P: StatefulOutputPin>(kernel: &'static Kernel, mut pin: P, period: u32) {
    let mut next = kernel.now();

    loop {
        if let Err(e) = pin.toggle() {
            warn!("heartbeat pin stuck: {e:?}");
        }

        next = next.wrapping_add(period.max(1));
        kernel.delay_until(next).await;
    }
}
