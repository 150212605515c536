//! Wiring the pipeline together.
//!
//! [`build`] creates the kernel, the shared cells and the tasks, in the order of the
//! multi-peripheral demo: LED, ADC, SPI, I2C, then the sink. Everything shared lives for the rest
//! of the program.

use core::fmt;

use embedded_hal::digital::StatefulOutputPin;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiBus;
use log::info;
use relay::sync::channel::Channel;
use relay::sync::SampleCell;
use relay::{Kernel, SchedulerStats, Semaphore, TaskConfig};

use crate::config::{
    AdcMode, HandoffKind, PipelineConfig, TaskTiming, QUEUE_DEPTH, TASK_STACK_SIZE,
};
use crate::error::SystemError;
use crate::handoff::AdcHandoff;
use crate::mailbox::Mailbox;
use crate::message::Message;
use crate::sim::{SimAdc, SimI2c, SimPin, SimSpi, SpiResponse, Waveform};
use crate::sink::{Inbox, Sink, SinkCounters, SinkStats};
use crate::source::SampleSource;
use crate::transport::Transport;
use crate::workers::{
    heartbeat, Activation, AdcJob, Handoff, I2cJob, Job, PolledAdcJob, SpiJob, Worker,
    WorkerCounters, WorkerStats,
};

fn leak<T>(value: T) -> &'static mut T {
    Box::leak(Box::new(value))
}

/// The hardware the pipeline drives.
pub struct Peripherals<S: 'static, B, I, P> {
    /// The analog source, shared with its interrupt handler.
    pub adc: &'static S,
    /// The SPI bus.
    pub spi: B,
    /// The I2C bus.
    pub i2c: I,
    /// The LED.
    pub led: P,
}

/// Simulated peripherals: the ADC converts `waveform` once per conversion period, the SPI
/// device loops back and the I2C bus has a device at the configured address.
pub fn simulated(
    config: &PipelineConfig,
    waveform: Waveform,
) -> Peripherals<SimAdc, SimSpi, SimI2c, SimPin> {
    let polls = config.ticks(config.conversion_period_ms);

    Peripherals {
        adc: leak(SimAdc::new(waveform).with_conversion_polls(polls)),
        spi: SimSpi::new(SpiResponse::Loopback),
        i2c: SimI2c::new(&[config.i2c_address]),
        led: SimPin::new(),
    }
}

/// Counters of every task.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    /// The sampling task.
    pub adc: WorkerCounters,
    /// The SPI task.
    pub spi: WorkerCounters,
    /// The I2C task.
    pub i2c: WorkerCounters,
    /// The sink.
    pub sink: SinkCounters,
}

impl PipelineCounters {
    const fn new() -> Self {
        Self {
            adc: WorkerCounters::new(),
            spi: WorkerCounters::new(),
            i2c: WorkerCounters::new(),
            sink: SinkCounters::new(),
        }
    }
}

/// A snapshot of the running system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Current time in ticks.
    pub now: u32,
    /// Kernel counters.
    pub scheduler: SchedulerStats,
    /// The sampling task.
    pub adc: WorkerStats,
    /// The SPI task.
    pub spi: WorkerStats,
    /// The I2C task.
    pub i2c: WorkerStats,
    /// The sink.
    pub sink: SinkStats,
    /// Runs of the end-of-conversion handler, if one is bound.
    pub adc_interrupts: Option<u32>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.scheduler;
        writeln!(
            f,
            "t={} ticks={} dispatches={} switches={} idle={} interrupts={}",
            self.now, s.ticks, s.dispatches, s.context_switches, s.idle_ticks, s.interrupts
        )?;
        for (name, w) in [("ADC", self.adc), ("SPI", self.spi), ("I2C", self.i2c)] {
            writeln!(
                f,
                "{name}: activations={} sent={} failed={} skipped={} dropped={} missed_signals={}",
                w.activations, w.sent, w.failed, w.skipped, w.dropped, w.missed_signals
            )?;
        }
        write!(
            f,
            "sink: sent={} failed={} bytes={}",
            self.sink.sent, self.sink.failed, self.sink.bytes
        )
    }
}

/// The assembled pipeline.
pub struct System<S: 'static> {
    kernel: &'static Kernel,
    counters: &'static PipelineCounters,
    handoff: Option<&'static AdcHandoff<S>>,
}

impl<S: SampleSource + 'static> System<S> {
    /// The kernel running the pipeline.
    pub fn kernel(&self) -> &'static Kernel {
        self.kernel
    }

    /// The end-of-conversion handler, unless the ADC is polled.
    pub fn handoff(&self) -> Option<&'static AdcHandoff<S>> {
        self.handoff
    }

    /// Start scheduling.
    pub fn start(&self) -> Result<(), SystemError> {
        self.kernel.start()?;
        Ok(())
    }

    /// Let `ticks` ticks pass.
    pub fn run_for(&self, ticks: u32) {
        self.kernel.run_for(ticks);
    }

    /// Read every counter.
    pub fn report(&self) -> Report {
        Report {
            now: self.kernel.now(),
            scheduler: self.kernel.stats(),
            adc: self.counters.adc.stats(),
            spi: self.counters.spi.stats(),
            i2c: self.counters.i2c.stats(),
            sink: self.counters.sink.stats(),
            adc_interrupts: self.handoff.map(|h| h.invocations()),
        }
    }
}

/// Create every task of the pipeline. The system is ready to [`System::start`].
pub fn build<S, B, I, P, T>(
    config: &PipelineConfig,
    peripherals: Peripherals<S, B, I, P>,
    transport: T,
) -> Result<System<S>, SystemError>
where
    S: SampleSource + 'static,
    B: SpiBus<u8> + Send + 'static,
    I: I2c + Send + 'static,
    P: StatefulOutputPin + Send + 'static,
    T: Transport + Send + 'static,
{
    let kernel: &'static Kernel = leak(Kernel::new(config.kernel));
    let counters: &'static PipelineCounters = leak(PipelineCounters::new());
    let Peripherals { adc, spi, i2c, led } = peripherals;

    adc.configure(config.adc_channel, config.adc_sample_time)?;

    let (inbox, [adc_out, spi_out, i2c_out]) = match config.handoff {
        HandoffKind::Queue => {
            let channel: &'static Channel<Message, QUEUE_DEPTH> = leak(Channel::new());
            let (sender, receiver) = channel.split()?;
            (
                Inbox::Queue(receiver),
                [
                    Handoff::Queue(sender.clone()),
                    Handoff::Queue(sender.clone()),
                    Handoff::Queue(sender),
                ],
            )
        }
        HandoffKind::Mailbox => {
            let mailbox: &'static Mailbox = leak(Mailbox::new());
            (
                Inbox::Mailbox(mailbox),
                [
                    Handoff::Mailbox(mailbox),
                    Handoff::Mailbox(mailbox),
                    Handoff::Mailbox(mailbox),
                ],
            )
        }
    };

    let wiring = Wiring {
        kernel,
        handoff_timeout: config.ticks(config.handoff_timeout_ms),
    };

    kernel.spawn(
        TaskConfig::new("LED", config.heartbeat.priority).stack_size(TASK_STACK_SIZE),
        leak(heartbeat(kernel, led, config.ticks(config.heartbeat.period_ms))),
    )?;

    let adc_period = Activation::Periodic {
        period: config.ticks(config.adc.period_ms),
    };
    let cell: &'static SampleCell = leak(SampleCell::new());

    let handoff = match config.adc_mode {
        AdcMode::Periodic => {
            let handoff: &'static AdcHandoff<S> = leak(AdcHandoff::new(adc, cell));
            let job = AdcJob::latest(cell.reader());
            wiring.spawn_worker("ADC", config.adc, job, adc_period, adc_out, &counters.adc)?;
            Some(handoff)
        }
        AdcMode::Signal => {
            let ready: &'static Semaphore = leak(Semaphore::binary());
            let handoff: &'static AdcHandoff<S> =
                leak(AdcHandoff::new(adc, cell).with_signal(ready));
            let activation = Activation::Signal {
                semaphore: ready,
                timeout: config.ticks(config.signal_timeout_ms),
            };
            let job = AdcJob::every_sample(cell.reader());
            wiring.spawn_worker("ADC", config.adc, job, activation, adc_out, &counters.adc)?;
            Some(handoff)
        }
        AdcMode::Polled => {
            let job = PolledAdcJob::new(adc, config.spin_budget);
            wiring.spawn_worker("ADC", config.adc, job, adc_period, adc_out, &counters.adc)?;
            None
        }
    };

    let spi_period = Activation::Periodic {
        period: config.ticks(config.spi.period_ms),
    };
    let spi_job = SpiJob::new(spi);
    wiring.spawn_worker("SPI", config.spi, spi_job, spi_period, spi_out, &counters.spi)?;

    let i2c_period = Activation::Periodic {
        period: config.ticks(config.i2c.period_ms),
    };
    let i2c_job = I2cJob::new(i2c, config.i2c_address);
    wiring.spawn_worker("I2C", config.i2c, i2c_job, i2c_period, i2c_out, &counters.i2c)?;

    let sink = Sink {
        kernel,
        inbox,
        transport,
        counters: &counters.sink,
    };
    kernel.spawn(
        TaskConfig::new("UART", config.sink_priority).stack_size(TASK_STACK_SIZE),
        leak(sink.run()),
    )?;

    if let Some(handoff) = handoff {
        kernel.bind_interrupt(handoff)?;
        adc.start_continuous();
    }

    info!(
        "pipeline assembled: {:?} handoff, {:?} ADC, {} Hz tick",
        config.handoff, config.adc_mode, config.kernel.tick_hz
    );

    Ok(System {
        kernel,
        counters,
        handoff,
    })
}

struct Wiring {
    kernel: &'static Kernel,
    handoff_timeout: u32,
}

impl Wiring {
    fn spawn_worker<J>(
        &self,
        name: &'static str,
        timing: TaskTiming,
        job: J,
        activation: Activation,
        handoff: Handoff,
        counters: &'static WorkerCounters,
    ) -> Result<(), SystemError>
    where
        J: Job + Send + 'static,
    {
        let worker = Worker {
            kernel: self.kernel,
            job,
            activation,
            handoff,
            handoff_timeout: self.handoff_timeout,
            counters,
        };

        self.kernel.spawn(
            TaskConfig::new(name, timing.priority).stack_size(TASK_STACK_SIZE),
            leak(worker.run()),
        )?;
        Ok(())
    }
}
