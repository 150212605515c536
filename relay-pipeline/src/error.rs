//! Error types of the pipeline.

use core::fmt;

use relay::sync::channel::AlreadySplit;

use crate::message::MessageError;

/// A peripheral did not behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralError {
    /// A bounded wait for a hardware flag ran out.
    Timeout,
    /// The bus reported an error.
    Bus,
    /// The requested channel or setting does not exist.
    InvalidChannel,
}

impl fmt::Display for PeripheralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeripheralError::Timeout => f.write_str("peripheral timed out"),
            PeripheralError::Bus => f.write_str("bus error"),
            PeripheralError::InvalidChannel => f.write_str("invalid channel"),
        }
    }
}

impl std::error::Error for PeripheralError {}

impl From<relay::TimeoutError> for PeripheralError {
    fn from(_: relay::TimeoutError) -> Self {
        PeripheralError::Timeout
    }
}

/// A job could not produce its message for this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobError {
    /// The peripheral failed.
    Peripheral(PeripheralError),
    /// The message did not fit.
    Message(MessageError),
    /// Nothing happened since the last cycle that is worth a message.
    NothingNew,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::Peripheral(e) => write!(f, "{e}"),
            JobError::Message(e) => write!(f, "{e}"),
            JobError::NothingNew => f.write_str("nothing new to report"),
        }
    }
}

impl std::error::Error for JobError {}

impl From<PeripheralError> for JobError {
    fn from(e: PeripheralError) -> Self {
        JobError::Peripheral(e)
    }
}

impl From<MessageError> for JobError {
    fn from(e: MessageError) -> Self {
        JobError::Message(e)
    }
}

impl From<fmt::Error> for JobError {
    fn from(_: fmt::Error) -> Self {
        JobError::Message(MessageError::TooLong)
    }
}

/// Assembling the system failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemError {
    /// The kernel refused a task or an interrupt line.
    Kernel(relay::Error),
    /// A peripheral failed to initialize.
    Peripheral(PeripheralError),
    /// The message queue was already in use.
    Channel(AlreadySplit),
}

impl fmt::Display for SystemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemError::Kernel(e) => write!(f, "kernel: {e}"),
            SystemError::Peripheral(e) => write!(f, "peripheral: {e}"),
            SystemError::Channel(_) => f.write_str("message queue already split"),
        }
    }
}

impl std::error::Error for SystemError {}

impl From<relay::Error> for SystemError {
    fn from(e: relay::Error) -> Self {
        SystemError::Kernel(e)
    }
}

impl From<PeripheralError> for SystemError {
    fn from(e: PeripheralError) -> Self {
        SystemError::Peripheral(e)
    }
}

impl From<AlreadySplit> for SystemError {
    fn from(e: AlreadySplit) -> Self {
        SystemError::Channel(e)
    }
}
