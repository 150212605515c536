//! Pipeline settings.

use relay::KernelConfig;

/// Messages the queue holds: one per producer.
pub const QUEUE_DEPTH: usize = 3;

/// Context budget of the pipeline's tasks, in bytes.
pub const TASK_STACK_SIZE: usize = 2048;

/// How the ADC task gets its samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdcMode {
    /// Report the latest interrupt-delivered sample every period.
    #[default]
    Periodic,
    /// Report every interrupt-delivered sample as it arrives.
    Signal,
    /// Start a conversion every period and poll for its completion.
    Polled,
}

/// How producers hand messages to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandoffKind {
    /// A FIFO queue with one slot per producer.
    #[default]
    Queue,
    /// A single slot held by one producer at a time.
    Mailbox,
}

/// Period and priority of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskTiming {
    /// Activation period in milliseconds.
    pub period_ms: u32,
    /// Scheduling priority.
    pub priority: u8,
}

impl TaskTiming {
    /// A task running every `period_ms` at `priority`.
    pub const fn new(period_ms: u32, priority: u8) -> Self {
        Self {
            period_ms,
            priority,
        }
    }
}

/// Everything the system assembly needs to know.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Kernel settings.
    pub kernel: KernelConfig,
    /// The LED task.
    pub heartbeat: TaskTiming,
    /// The sampling task.
    pub adc: TaskTiming,
    /// The SPI polling task.
    pub spi: TaskTiming,
    /// The I2C polling task.
    pub i2c: TaskTiming,
    /// Priority of the sink task.
    pub sink_priority: u8,
    /// How long a producer waits for the sink before dropping its message.
    pub handoff_timeout_ms: u32,
    /// How producers reach the sink.
    pub handoff: HandoffKind,
    /// Where the ADC task gets its samples.
    pub adc_mode: AdcMode,
    /// Analog channel to sample.
    pub adc_channel: u8,
    /// Sample time setting of the channel.
    pub adc_sample_time: u8,
    /// Time between two continuous conversions.
    pub conversion_period_ms: u32,
    /// How long the ADC task waits for a signalled sample.
    pub signal_timeout_ms: u32,
    /// Status polls a polled conversion may take.
    pub spin_budget: u32,
    /// Address probed by the I2C task.
    pub i2c_address: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineConfig {
    /// The defaults of the multi-peripheral demo.
    pub const fn new() -> Self {
        Self {
            kernel: KernelConfig::new(),
            heartbeat: TaskTiming::new(500, 1),
            adc: TaskTiming::new(1000, 2),
            spi: TaskTiming::new(2000, 2),
            i2c: TaskTiming::new(3000, 2),
            sink_priority: 3,
            handoff_timeout_ms: 100,
            handoff: HandoffKind::Queue,
            adc_mode: AdcMode::Periodic,
            adc_channel: 4,
            adc_sample_time: 7,
            conversion_period_ms: 100,
            signal_timeout_ms: 2000,
            spin_budget: 10_000,
            i2c_address: 0x3c,
        }
    }

    /// Convert milliseconds to ticks of the configured kernel.
    pub const fn ticks(&self, ms: u32) -> u32 {
        self.kernel.ms_to_ticks(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_demo() {
        let config = PipelineConfig::new();
        assert_eq!(config.ticks(config.heartbeat.period_ms), 500);
        assert_eq!(config.ticks(config.i2c.period_ms), 3000);
        assert!(config.sink_priority > config.adc.priority);
        assert!(config.adc.priority > config.heartbeat.priority);

        let slow = PipelineConfig {
            kernel: KernelConfig::with_tick_hz(100),
            ..config
        };
        assert_eq!(slow.ticks(slow.adc.period_ms), 100);
    }
}
