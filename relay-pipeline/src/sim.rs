//! Simulated peripherals for running the pipeline on a host.
//!
//! The simulated ADC has no clock of its own: time passes for it when its status flag is read.
//! Bound to the tick, the handoff samples the flag once per tick, so a conversion takes
//! `conversion_polls` ticks.

use std::sync::Arc;

use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin, StatefulOutputPin};
use embedded_hal::i2c::{self, I2c, NoAcknowledgeSource, Operation};
use embedded_hal::spi::{self, SpiBus};
use heapless::Vec;
use portable_atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU8, Ordering};
use relay::time::poll::spin_until;

use crate::error::PeripheralError;
use crate::source::{SampleSource, MAX_CHANNEL, MAX_SAMPLE_TIME};

/// Status polls a calibration may take before it counts as stalled.
pub const CALIBRATION_BUDGET: u32 = 1000;

/// What the simulated analog input sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    /// A fixed level.
    Constant(u16),
    /// A sawtooth that starts at `start` and rises by `step` per conversion.
    Ramp {
        /// First value.
        start: u16,
        /// Increase per conversion.
        step: u16,
    },
    /// A fixed sequence, repeated.
    Sequence(&'static [u16]),
}

impl Waveform {
    /// The value of conversion number `n`, within 12 bits.
    pub fn sample(&self, n: u32) -> u16 {
        let raw = match *self {
            Waveform::Constant(level) => u32::from(level),
            Waveform::Ramp { start, step } => {
                u32::from(start).wrapping_add(u32::from(step).wrapping_mul(n))
            }
            Waveform::Sequence(values) if values.is_empty() => 0,
            Waveform::Sequence(values) => u32::from(values[n as usize % values.len()]),
        };

        (raw & 0x0fff) as u16
    }
}

/// A simulated 12-bit ADC.
pub struct SimAdc {
    waveform: Waveform,
    conversion_polls: u32,
    calibration_polls: u32,
    channel: AtomicU8,
    continuous: AtomicBool,
    converting: AtomicBool,
    eoc: AtomicBool,
    stalled: AtomicBool,
    data: AtomicU16,
    progress: AtomicU32,
    conversions: AtomicU32,
}

impl SimAdc {
    /// An ADC converting `waveform`, one conversion per status read.
    pub const fn new(waveform: Waveform) -> Self {
        Self {
            waveform,
            conversion_polls: 1,
            calibration_polls: 3,
            channel: AtomicU8::new(0),
            continuous: AtomicBool::new(false),
            converting: AtomicBool::new(false),
            eoc: AtomicBool::new(false),
            stalled: AtomicBool::new(false),
            data: AtomicU16::new(0),
            progress: AtomicU32::new(0),
            conversions: AtomicU32::new(0),
        }
    }

    /// Take `polls` status reads per conversion.
    pub const fn with_conversion_polls(mut self, polls: u32) -> Self {
        self.conversion_polls = if polls == 0 { 1 } else { polls };
        self
    }

    /// Freeze the hardware: calibration and conversions never complete.
    pub fn set_stalled(&self, stalled: bool) {
        self.stalled.store(stalled, Ordering::Release);
    }

    /// Conversions completed so far.
    pub fn conversions(&self) -> u32 {
        self.conversions.load(Ordering::Acquire)
    }

    /// The configured channel.
    pub fn channel(&self) -> u8 {
        self.channel.load(Ordering::Acquire)
    }
}

impl SampleSource for SimAdc {
    fn configure(&self, channel: u8, sample_time: u8) -> Result<(), PeripheralError> {
        if channel > MAX_CHANNEL || sample_time > MAX_SAMPLE_TIME {
            return Err(PeripheralError::InvalidChannel);
        }
        self.channel.store(channel, Ordering::Release);

        let mut polls = 0;
        spin_until(CALIBRATION_BUDGET, || {
            polls += 1;
            !self.stalled.load(Ordering::Acquire) && polls >= self.calibration_polls
        })?;

        Ok(())
    }

    fn start_continuous(&self) {
        self.continuous.store(true, Ordering::Release);
        self.start_conversion();
    }

    fn start_conversion(&self) {
        self.progress.store(0, Ordering::Release);
        self.converting.store(true, Ordering::Release);
    }

    fn end_of_conversion(&self) -> bool {
        if self.eoc.load(Ordering::Acquire) {
            return true;
        }

        if !self.converting.load(Ordering::Acquire) || self.stalled.load(Ordering::Acquire) {
            return false;
        }

        if self.progress.fetch_add(1, Ordering::AcqRel) + 1 < self.conversion_polls {
            return false;
        }

        let n = self.conversions.fetch_add(1, Ordering::AcqRel);
        self.data.store(self.waveform.sample(n), Ordering::Release);
        self.progress.store(0, Ordering::Release);
        self.converting
            .store(self.continuous.load(Ordering::Acquire), Ordering::Release);
        self.eoc.store(true, Ordering::Release);
        true
    }

    fn read_data(&self) -> u16 {
        self.data.load(Ordering::Acquire)
    }

    fn clear_end_of_conversion(&self) {
        self.eoc.store(false, Ordering::Release);
    }
}

/// Error of the simulated buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimBusError;

impl spi::Error for SimBusError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

impl i2c::Error for SimBusError {
    fn kind(&self) -> i2c::ErrorKind {
        i2c::ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

/// How the simulated SPI device answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiResponse {
    /// MISO is wired to MOSI.
    Loopback,
    /// The device shifts out the same byte every time.
    Fixed(u8),
    /// Every transfer fails.
    Fail,
}

/// A simulated full-duplex SPI bus.
#[derive(Debug)]
pub struct SimSpi {
    response: SpiResponse,
    transfers: u32,
}

impl SimSpi {
    /// A bus whose device answers with `response`.
    pub const fn new(response: SpiResponse) -> Self {
        Self {
            response,
            transfers: 0,
        }
    }

    /// Bytes shifted so far.
    pub fn transfers(&self) -> u32 {
        self.transfers
    }

    fn shift(&mut self, out: u8) -> Result<u8, SimBusError> {
        self.transfers += 1;
        match self.response {
            SpiResponse::Loopback => Ok(out),
            SpiResponse::Fixed(byte) => Ok(byte),
            SpiResponse::Fail => Err(SimBusError),
        }
    }
}

impl spi::ErrorType for SimSpi {
    type Error = SimBusError;
}

impl SpiBus<u8> for SimSpi {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.shift(0)?;
        }
        Ok(())
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        for &word in words {
            self.shift(word)?;
        }
        Ok(())
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        for i in 0..read.len().max(write.len()) {
            let received = self.shift(write.get(i).copied().unwrap_or(0))?;
            if let Some(slot) = read.get_mut(i) {
                *slot = received;
            }
        }
        Ok(())
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        for word in words {
            *word = self.shift(*word)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A simulated I2C bus with a fixed set of devices.
#[derive(Debug, Default)]
pub struct SimI2c {
    devices: Vec<u8, 8>,
}

impl SimI2c {
    /// A bus with the devices at `addresses`. Addresses past the eighth are ignored.
    pub fn new(addresses: &[u8]) -> Self {
        Self {
            devices: addresses.iter().copied().take(8).collect(),
        }
    }
}

impl i2c::ErrorType for SimI2c {
    type Error = SimBusError;
}

impl I2c for SimI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if !self.devices.contains(&address) {
            return Err(SimBusError);
        }

        for operation in operations {
            if let Operation::Read(buffer) = operation {
                buffer.fill(0);
            }
        }
        Ok(())
    }
}

/// A simulated output pin that counts its edges.
#[derive(Debug, Default)]
pub struct SimPin {
    high: bool,
    edges: Arc<AtomicU32>,
}

impl SimPin {
    /// A pin driven low.
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared counter of level changes, readable after the pin moved into a task.
    pub fn edges(&self) -> Arc<AtomicU32> {
        self.edges.clone()
    }

    fn drive(&mut self, high: bool) {
        if self.high != high {
            self.high = high;
            self.edges.fetch_add(1, Ordering::AcqRel);
        }
    }
}

impl PinErrorType for SimPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

impl StatefulOutputPin for SimPin {
    fn is_set_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.high)
    }

    fn is_set_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waveforms_stay_within_twelve_bits() {
        assert_eq!(Waveform::Constant(2048).sample(7), 2048);
        assert_eq!(Waveform::Constant(0xffff).sample(0), 0x0fff);

        let ramp = Waveform::Ramp { start: 4000, step: 50 };
        assert_eq!(ramp.sample(0), 4000);
        assert_eq!(ramp.sample(1), 4050);
        assert_eq!(ramp.sample(2), 4);

        let seq = Waveform::Sequence(&[1, 2, 3]);
        assert_eq!(seq.sample(4), 2);
        assert_eq!(Waveform::Sequence(&[]).sample(4), 0);
    }

    #[test]
    fn conversion_takes_the_configured_polls() {
        let adc = SimAdc::new(Waveform::Sequence(&[10, 20])).with_conversion_polls(3);
        adc.configure(4, 7).unwrap();
        adc.start_continuous();

        assert!(!adc.end_of_conversion());
        assert!(!adc.end_of_conversion());
        assert!(adc.end_of_conversion());
        assert_eq!(adc.read_data(), 10);

        // The flag stays up until acknowledged.
        assert!(adc.end_of_conversion());
        adc.clear_end_of_conversion();

        assert!(!adc.end_of_conversion());
        assert!(!adc.end_of_conversion());
        assert!(adc.end_of_conversion());
        assert_eq!(adc.read_data(), 20);
        assert_eq!(adc.conversions(), 2);
    }

    #[test]
    fn single_conversion_stops() {
        let adc = SimAdc::new(Waveform::Constant(5));
        adc.start_conversion();
        assert!(adc.end_of_conversion());
        adc.clear_end_of_conversion();

        assert!(!adc.end_of_conversion());
        assert_eq!(adc.conversions(), 1);
    }

    #[test]
    fn configure_checks_its_arguments_and_the_hardware() {
        let adc = SimAdc::new(Waveform::Constant(0));
        assert_eq!(adc.configure(18, 0), Err(PeripheralError::InvalidChannel));
        assert_eq!(adc.configure(4, 8), Err(PeripheralError::InvalidChannel));

        adc.set_stalled(true);
        assert_eq!(adc.configure(4, 7), Err(PeripheralError::Timeout));

        adc.set_stalled(false);
        assert_eq!(adc.configure(4, 7), Ok(()));
        assert_eq!(adc.channel(), 4);
    }

    #[test]
    fn spi_responses() {
        let mut buf = [0x55];
        let mut bus = SimSpi::new(SpiResponse::Loopback);
        bus.transfer_in_place(&mut buf).unwrap();
        assert_eq!(buf, [0x55]);

        let mut bus = SimSpi::new(SpiResponse::Fixed(0xa5));
        bus.transfer_in_place(&mut buf).unwrap();
        assert_eq!(buf, [0xa5]);
        assert_eq!(bus.transfers(), 1);

        let mut bus = SimSpi::new(SpiResponse::Fail);
        assert_eq!(bus.transfer_in_place(&mut buf), Err(SimBusError));
    }

    #[test]
    fn i2c_acks_known_devices_only() {
        let mut bus = SimI2c::new(&[0x3c]);
        assert_eq!(bus.write(0x3c, &[]), Ok(()));
        assert_eq!(bus.write(0x50, &[]), Err(SimBusError));
    }

    #[test]
    fn pin_counts_edges() {
        let mut pin = SimPin::new();
        let edges = pin.edges();

        pin.toggle().unwrap();
        pin.toggle().unwrap();
        pin.set_low().unwrap();

        assert_eq!(edges.load(Ordering::Acquire), 2);
        assert!(pin.is_set_low().unwrap());
    }
}
