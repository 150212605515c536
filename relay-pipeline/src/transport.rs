//! The physical output the sink drains into.

use core::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// A byte sink that blocks until the hardware has accepted the bytes.
///
/// Only the sink task writes to the transport.
pub trait Transport {
    /// Why a write failed.
    type Error: fmt::Display;

    /// Write all of `bytes`.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// Writes to the process's standard output.
#[derive(Debug, Default)]
pub struct StdoutTransport;

impl Transport for StdoutTransport {
    type Error = io::Error;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()
    }
}

/// A write refused by [`CaptureTransport::fail_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejected;

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("write rejected")
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    writes: usize,
    fail_next: usize,
}

/// Records everything written to it. Clones share the recording.
#[derive(Debug, Clone, Default)]
pub struct CaptureTransport {
    inner: Arc<Mutex<Captured>>,
}

impl CaptureTransport {
    /// An empty recording.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().bytes).into_owned()
    }

    /// The recording split after every `\r\n`, line endings kept.
    pub fn lines(&self) -> Vec<String> {
        self.contents()
            .split_inclusive("\r\n")
            .map(str::to_owned)
            .collect()
    }

    /// Successful writes so far.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }

    /// Refuse the next `count` writes.
    pub fn fail_next(&self, count: usize) {
        self.inner.lock().fail_next = count;
    }
}

impl Transport for CaptureTransport {
    type Error = Rejected;

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        let mut inner = self.inner.lock();
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(Rejected);
        }

        inner.bytes.extend_from_slice(bytes);
        inner.writes += 1;
        Ok(())
    }
}
