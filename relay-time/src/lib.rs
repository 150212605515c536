//! Time-related building blocks.
//!
//! This crate contains the tick arithmetic, the software timer queue that turns a periodic tick
//! into `Delay` and `Timeout` futures, and bounded polling helpers for hardware status flags.

#![no_std]
#![deny(missing_docs)]

#[cfg(test)]
#[macro_use]
extern crate std;

pub mod poll;
pub mod timer_queue;

pub use timer_queue::{Delay, Ticks, Timeout, TimerQueue};

/// This indicates that there was a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct TimeoutError;

impl core::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("timed out")
    }
}

/// How long a blocking call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Wait {
    /// Give up after this many ticks. `Ticks(0)` never suspends.
    Ticks(u32),
    /// Wait until the operation completes.
    Forever,
}
