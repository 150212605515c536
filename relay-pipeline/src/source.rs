//! The analog sample source contract.
//!
//! Sources are shared between the interrupt handoff and tasks, so every operation takes `&self`,
//! the way memory-mapped registers are shared.

use crate::error::PeripheralError;

/// Largest raw value of the 12-bit source domain.
pub const FULL_SCALE: u16 = 4095;

/// Highest analog channel number.
pub const MAX_CHANNEL: u8 = 17;

/// Longest sample time setting.
pub const MAX_SAMPLE_TIME: u8 = 7;

/// An analog channel that signals conversion completion.
pub trait SampleSource: Sync {
    /// Select `channel` and its sample time, then calibrate. Calibration polls the hardware
    /// with a bounded budget.
    fn configure(&self, channel: u8, sample_time: u8) -> Result<(), PeripheralError>;

    /// Convert back to back. Each completion sets the end-of-conversion flag.
    fn start_continuous(&self);

    /// Start one conversion.
    fn start_conversion(&self);

    /// The end-of-conversion flag.
    fn end_of_conversion(&self) -> bool;

    /// The data register, 0..=4095.
    fn read_data(&self) -> u16;

    /// Acknowledge the completed conversion.
    fn clear_end_of_conversion(&self);
}

/// Map a raw sample to a percentage of full scale.
pub fn percent(raw: u16) -> u32 {
    u32::from(raw.min(FULL_SCALE)) * 100 / u32::from(FULL_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_full_scale() {
        assert_eq!(percent(0), 0);
        assert_eq!(percent(2048), 50);
        assert_eq!(percent(FULL_SCALE), 100);
        assert_eq!(percent(u16::MAX), 100);
    }
}
