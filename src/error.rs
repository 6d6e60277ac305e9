//! Driver error taxonomy

use core::fmt::{self, Display};

/// Errors reported by the DMA manager and the SPI engine
///
/// Configuration-time errors are returned synchronously and never leave
/// shared state partially mutated. Errors discovered in interrupt context
/// are folded into the owning message's completion status instead; see
/// [`MessageStatus`](crate::MessageStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// A required value is missing or out of range
    ///
    /// Covers out-of-range channel indices, word widths, speeds outside
    /// the device's resolved range, byte counts beyond the hardware
    /// counter, and transfers with neither buffer supplied.
    InvalidArgument,
    /// The hardware cannot provide the requested capability
    Unsupported,
    /// The DMA channel already has a registered callback
    AlreadyBound,
    /// The DMA channel's registered callback does not match
    NotBound,
    /// A bounded queue or table is full
    QueueFull,
    /// A transfer was submitted with a zero byte count
    BufferTooSmall,
    /// The hardware reported a transfer error
    Io,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => f.write_str("invalid argument"),
            Error::Unsupported => f.write_str("not supported by hardware"),
            Error::AlreadyBound => f.write_str("channel callback already bound"),
            Error::NotBound => f.write_str("channel callback not bound"),
            Error::QueueFull => f.write_str("queue full"),
            Error::BufferTooSmall => f.write_str("transfer byte count is zero"),
            Error::Io => f.write_str("hardware transfer error"),
        }
    }
}
