//! A single-writer, multi-reader cell for the latest sample of a source.
//!
//! The value and a sequence number are packed into one word and published with a single atomic
//! store, so readers never observe a torn update. Readers keep their own cursor and never write
//! the cell, which lets any number of them consume it independently.

use portable_atomic::{AtomicU32, Ordering};

/// One published sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Sample {
    /// Publication number, never 0. Wraps from `u16::MAX` to 1.
    pub seq: u16,
    /// The raw sample.
    pub value: u16,
}

impl Sample {
    const fn pack(self) -> u32 {
        ((self.seq as u32) << 16) | self.value as u32
    }

    const fn unpack(word: u32) -> Option<Self> {
        let seq = (word >> 16) as u16;
        if seq == 0 {
            None
        } else {
            Some(Sample {
                seq,
                value: word as u16,
            })
        }
    }
}

const fn next_seq(seq: u16) -> u16 {
    match seq.wrapping_add(1) {
        0 => 1,
        n => n,
    }
}

/// Number of publications between two sequence numbers, accounting for the skipped 0.
const fn seq_distance(from: u16, to: u16) -> u32 {
    const SPAN: u32 = u16::MAX as u32;
    (to as u32 + SPAN - from as u32) % SPAN
}

/// The latest sample of a source.
///
/// Only one context (normally an interrupt handler) may call [`SampleCell::publish`].
pub struct SampleCell {
    word: AtomicU32,
}

impl Default for SampleCell {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleCell {
    /// An empty cell.
    pub const fn new() -> Self {
        Self {
            word: AtomicU32::new(0),
        }
    }

    /// Publish a new value, overwriting the previous one. Returns the assigned sequence number.
    pub fn publish(&self, value: u16) -> u16 {
        let prev = self.word.load(Ordering::Relaxed);
        let seq = next_seq((prev >> 16) as u16);
        self.word
            .store(Sample { seq, value }.pack(), Ordering::Release);
        seq
    }

    /// The latest sample, or `None` if nothing was published yet.
    pub fn latest(&self) -> Option<Sample> {
        Sample::unpack(self.word.load(Ordering::Acquire))
    }

    /// A reader whose cursor starts before the current sample: its first read returns the
    /// current sample as fresh, with nothing counted as missed.
    pub fn reader(&self) -> SampleReader<'_> {
        SampleReader {
            cell: self,
            last_seq: 0,
            overruns: 0,
        }
    }
}

/// Result of [`SampleReader::read`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub enum Reading {
    /// Nothing was ever published.
    Empty,
    /// The sample was already seen by this reader.
    Stale(u16),
    /// A new sample. `missed` samples were overwritten since the last read.
    Fresh {
        /// The sample value.
        value: u16,
        /// Samples published and overwritten between two reads.
        missed: u32,
    },
}

impl Reading {
    /// The value, fresh or not.
    pub fn value(&self) -> Option<u16> {
        match *self {
            Reading::Empty => None,
            Reading::Stale(value) | Reading::Fresh { value, .. } => Some(value),
        }
    }
}

/// A consumer's view of a [`SampleCell`].
pub struct SampleReader<'a> {
    cell: &'a SampleCell,
    last_seq: u16,
    overruns: u32,
}

impl SampleReader<'_> {
    /// Read the latest sample and advance the cursor.
    pub fn read(&mut self) -> Reading {
        let Some(sample) = self.cell.latest() else {
            return Reading::Empty;
        };

        if sample.seq == self.last_seq {
            return Reading::Stale(sample.value);
        }

        // The first read has nothing to compare against.
        let missed = if self.last_seq == 0 {
            0
        } else {
            seq_distance(self.last_seq, sample.seq).saturating_sub(1)
        };

        self.last_seq = sample.seq;
        self.overruns = self.overruns.saturating_add(missed);

        Reading::Fresh {
            value: sample.value,
            missed,
        }
    }

    /// Total samples this reader never saw because they were overwritten.
    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}
