//! Outgoing messages and their wire format.
//!
//! Every message is one ASCII line, `[<TAG>] <text>\r\n`, where the tag is padded to four
//! characters. A message never exceeds [`MESSAGE_LEN`] bytes.

use core::fmt;

use heapless::String;

/// Maximum length of a message on the wire, line ending included.
pub const MESSAGE_LEN: usize = 64;

const LINE_END: &str = "\r\n";

/// Identifies the producer of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// The analog sampling task.
    Adc,
    /// The SPI polling task.
    Spi,
    /// The I2C polling task.
    I2c,
}

impl Tag {
    /// The tag as written on the wire, without the padding.
    pub fn name(self) -> &'static str {
        match self {
            Tag::Adc => "ADC",
            Tag::Spi => "SPI",
            Tag::I2c => "I2C",
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:<4}]", self.name())
    }
}

/// The message does not fit in [`MESSAGE_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageError {
    /// Text was cut off.
    TooLong,
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::TooLong => write!(f, "message longer than {MESSAGE_LEN} bytes"),
        }
    }
}

impl std::error::Error for MessageError {}

/// A formatted line on its way to the sink.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Message {
    text: String<MESSAGE_LEN>,
}

impl Message {
    /// An empty message.
    pub const fn new() -> Self {
        Self {
            text: String::new(),
        }
    }

    /// Build a complete line in one go.
    pub fn line(tag: Tag, text: &str) -> Result<Self, MessageError> {
        let mut msg = Self::new();
        msg.begin(tag)?;
        msg.push_str(text)?;
        msg.finish()?;
        Ok(msg)
    }

    /// Clear the message and write the tag.
    pub fn begin(&mut self, tag: Tag) -> Result<(), MessageError> {
        self.text.clear();
        fmt::Write::write_fmt(self, format_args!("{tag} ")).map_err(|_| MessageError::TooLong)
    }

    /// Append text.
    pub fn push_str(&mut self, text: &str) -> Result<(), MessageError> {
        // The line ending always has to fit after the text.
        if self.text.len() + text.len() + LINE_END.len() > MESSAGE_LEN {
            return Err(MessageError::TooLong);
        }

        self.text.push_str(text).map_err(|_| MessageError::TooLong)
    }

    /// Terminate the line.
    pub fn finish(&mut self) -> Result<(), MessageError> {
        self.text
            .push_str(LINE_END)
            .map_err(|_| MessageError::TooLong)
    }

    /// The message text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The bytes to put on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Write for Message {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_str(s).map_err(|_| fmt::Error)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", self.as_str())
    }
}
