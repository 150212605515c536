//! Synchronization primitives for asynchronous contexts.

#![no_std]
#![deny(missing_docs)]

pub mod channel;
pub mod sample;
pub mod semaphore;
pub use portable_atomic;

pub use sample::{Reading, Sample, SampleCell, SampleReader};
pub use semaphore::{GiveOutcome, Semaphore, SemaphoreKind};

/// How many tasks can block on one primitive at the same time.
pub const MAX_WAITERS: usize = 16;

#[cfg(test)]
#[macro_use]
extern crate std;
