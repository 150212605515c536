//! An interrupt-driven sampling and dissemination pipeline on the `relay` kernel.
//!
//! An end-of-conversion interrupt stores each ADC sample into a [`SampleCell`] and may signal a
//! semaphore. Worker tasks read the sample or poll other peripherals on their own schedule,
//! format one line each and hand it to the sink task, which owns the transport and writes lines
//! out one at a time.
//!
//! ```text
//! SampleSource --EOC--> AdcHandoff --> SampleCell --> Worker --+
//!                                                             +--> queue | mailbox --> Sink --> Transport
//!                          SPI / I2C polling Workers ---------+
//! ```
//!
//! Peripherals are reached through the [`SampleSource`] contract and the `embedded-hal` traits;
//! [`sim`] has host implementations of all of them.
//!
//! [`SampleCell`]: relay::sync::SampleCell

#![deny(missing_docs)]
#![deny(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod handoff;
pub mod mailbox;
pub mod message;
pub mod sim;
pub mod sink;
pub mod source;
pub mod system;
pub mod transport;
pub mod workers;

pub use config::{AdcMode, HandoffKind, PipelineConfig, TaskTiming, QUEUE_DEPTH};
pub use error::{JobError, PeripheralError, SystemError};
pub use handoff::AdcHandoff;
pub use mailbox::Mailbox;
pub use message::{Message, MessageError, Tag, MESSAGE_LEN};
pub use sink::{Sink, BANNER};
pub use source::SampleSource;
pub use system::{build, simulated, Peripherals, Report, System};
pub use transport::{CaptureTransport, StdoutTransport, Transport};
pub use workers::{Activation, Handoff, Job, Worker};
