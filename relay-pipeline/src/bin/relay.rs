//! Run the multi-peripheral demo on simulated hardware.
//!
//! Messages go to stdout, logs to stderr.

use std::io::Write as _;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use log::{info, LevelFilter, Log, Metadata, Record};
use relay::KernelConfig;
use relay_pipeline::sim::Waveform;
use relay_pipeline::{AdcMode, HandoffKind, PipelineConfig, StdoutTransport};

#[derive(ValueEnum, Copy, Clone, Debug)]
enum HandoffArg {
    /// One queue slot per producer.
    Queue,
    /// A single slot held by one producer at a time.
    Mailbox,
}

#[derive(ValueEnum, Copy, Clone, Debug)]
enum AdcModeArg {
    /// Report the latest sample every period.
    Periodic,
    /// Report every sample as its interrupt arrives.
    Signal,
    /// Start and poll one conversion every period.
    Polled,
}

#[derive(ValueEnum, Copy, Clone, Debug)]
enum WaveformArg {
    /// A fixed level, see `--level`.
    Constant,
    /// A sawtooth over the full range.
    Ramp,
}

#[derive(ValueEnum, Copy, Clone, Debug)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::Off,
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

/// Interrupt-driven sampling pipeline on the relay kernel, with simulated peripherals.
#[derive(Parser, Debug)]
#[command(name = "relay", version)]
struct Cli {
    /// Ticks to run before printing the report.
    #[arg(long, default_value_t = 10_000)]
    ticks: u32,

    /// Tick rate in Hz.
    #[arg(long, default_value_t = relay::DEFAULT_TICK_HZ)]
    tick_hz: u32,

    /// How producers reach the sink.
    #[arg(long, value_enum, default_value_t = HandoffArg::Queue)]
    handoff: HandoffArg,

    /// How the ADC task gets its samples.
    #[arg(long, value_enum, default_value_t = AdcModeArg::Periodic)]
    adc_mode: AdcModeArg,

    /// What the simulated ADC input sees.
    #[arg(long, value_enum, default_value_t = WaveformArg::Ramp)]
    waveform: WaveformArg,

    /// Level of the constant waveform, 0..=4095.
    #[arg(long, default_value_t = 2048)]
    level: u16,

    /// Log level.
    #[arg(long, value_enum, env = "RELAY_LOG", default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            kernel: KernelConfig::with_tick_hz(self.tick_hz),
            handoff: match self.handoff {
                HandoffArg::Queue => HandoffKind::Queue,
                HandoffArg::Mailbox => HandoffKind::Mailbox,
            },
            adc_mode: match self.adc_mode {
                AdcModeArg::Periodic => AdcMode::Periodic,
                AdcModeArg::Signal => AdcMode::Signal,
                AdcModeArg::Polled => AdcMode::Polled,
            },
            ..PipelineConfig::new()
        }
    }

    fn waveform(&self) -> Waveform {
        match self.waveform {
            WaveformArg::Constant => Waveform::Constant(self.level),
            WaveformArg::Ramp => Waveform::Ramp {
                start: 0,
                step: 273,
            },
        }
    }
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = writeln!(
                std::io::stderr().lock(),
                "{:<5} {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    log::set_logger(&LOGGER).context("installing the logger")?;
    log::set_max_level(cli.log_level.into());

    let config = cli.config();
    let peripherals = relay_pipeline::simulated(&config, cli.waveform());
    let system = relay_pipeline::build(&config, peripherals, StdoutTransport)
        .context("assembling the pipeline")?;

    system.start().context("starting the scheduler")?;
    system.run_for(cli.ticks);

    info!("after {} ticks:\n{}", cli.ticks, system.report());
    Ok(())
}
