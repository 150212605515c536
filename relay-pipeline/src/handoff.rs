//! The end-of-conversion interrupt handler.
//!
//! The handler does the minimum: copy the data register into the sample cell with one atomic
//! store, acknowledge the conversion and signal whoever waits for fresh data. All further work
//! happens in task context.

use portable_atomic::{AtomicU32, Ordering};
use relay::sync::{Sample, SampleCell};
use relay::{InterruptHandler, Semaphore};

use crate::source::{SampleSource, FULL_SCALE};

/// Moves samples from a [`SampleSource`] into a [`SampleCell`].
pub struct AdcHandoff<S: 'static> {
    source: &'static S,
    cell: &'static SampleCell,
    signal: Option<&'static Semaphore>,
    invocations: AtomicU32,
    spurious: AtomicU32,
}

impl<S: SampleSource> AdcHandoff<S> {
    /// Publish samples of `source` into `cell`.
    pub const fn new(source: &'static S, cell: &'static SampleCell) -> Self {
        Self {
            source,
            cell,
            signal: None,
            invocations: AtomicU32::new(0),
            spurious: AtomicU32::new(0),
        }
    }

    /// Also give `semaphore` after every sample.
    pub const fn with_signal(mut self, semaphore: &'static Semaphore) -> Self {
        self.signal = Some(semaphore);
        self
    }

    /// The last stored sample, if any conversion completed yet.
    pub fn current_value(&self) -> Option<Sample> {
        self.cell.latest()
    }

    /// Times the handler ran.
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::Acquire)
    }

    /// Times the handler ran without a completed conversion.
    pub fn spurious(&self) -> u32 {
        self.spurious.load(Ordering::Acquire)
    }
}

impl<S: SampleSource> InterruptHandler for AdcHandoff<S> {
    fn is_pending(&self) -> bool {
        self.source.end_of_conversion()
    }

    fn on_interrupt(&self) {
        self.invocations.fetch_add(1, Ordering::AcqRel);

        if !self.source.end_of_conversion() {
            self.spurious.fetch_add(1, Ordering::AcqRel);
            return;
        }

        self.cell.publish(self.source.read_data().min(FULL_SCALE));
        self.source.clear_end_of_conversion();

        if let Some(semaphore) = self.signal {
            semaphore.give();
        }
    }

    fn name(&self) -> &'static str {
        "ADC1_2"
    }
}
