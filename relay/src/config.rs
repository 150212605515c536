//! Kernel and task configuration.

/// Default tick rate, one tick per millisecond.
pub const DEFAULT_TICK_HZ: u32 = 1000;

/// Default budget for a task's saved context, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 1024;

/// Kernel-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct KernelConfig {
    /// Tick interrupt rate in Hz.
    pub tick_hz: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelConfig {
    /// The default configuration.
    pub const fn new() -> Self {
        Self {
            tick_hz: DEFAULT_TICK_HZ,
        }
    }

    /// Run the tick at `tick_hz`. A rate of zero is raised to one.
    pub const fn with_tick_hz(tick_hz: u32) -> Self {
        Self {
            tick_hz: if tick_hz == 0 { 1 } else { tick_hz },
        }
    }

    /// Convert milliseconds to ticks, rounding up so a delay never gets shorter.
    pub const fn ms_to_ticks(&self, ms: u32) -> u32 {
        let ticks = (ms as u64 * self.tick_hz as u64).div_ceil(1000);
        if ticks > u32::MAX as u64 {
            u32::MAX
        } else {
            ticks as u32
        }
    }
}

/// Creation parameters of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TaskConfig {
    /// Name used in logs and diagnostics.
    pub name: &'static str,
    /// Bytes available to the task's saved context.
    pub stack_size: usize,
    /// Higher preempts lower.
    pub priority: u8,
}

impl TaskConfig {
    /// A task with the default stack budget.
    pub const fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            stack_size: DEFAULT_STACK_SIZE,
            priority,
        }
    }

    /// Set the stack budget.
    pub const fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ms_to_ticks_rounds_up() {
        assert_eq!(KernelConfig::new().ms_to_ticks(500), 500);
        assert_eq!(KernelConfig::with_tick_hz(100).ms_to_ticks(1000), 100);
        assert_eq!(KernelConfig::with_tick_hz(100).ms_to_ticks(15), 2);
        assert_eq!(KernelConfig::with_tick_hz(0).tick_hz, 1);
    }
}
