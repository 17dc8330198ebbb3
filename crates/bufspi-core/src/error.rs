//! Error types for bufspi-core
//!
//! This module provides a no_std compatible error type shared by the
//! channel, the stream traits and the hardware abstraction traits.

use core::fmt;

/// POSIX errno values used for the raw stream adapters
pub mod errno {
    /// I/O error
    pub const EIO: i32 = 5;
    /// Bad file descriptor
    pub const EBADF: i32 = 9;
    /// Resource temporarily unavailable
    pub const EAGAIN: i32 = 11;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// Illegal seek
    pub const ESPIPE: i32 = 29;
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Stream errors
    /// Non-blocking operation found no data (or no room) and would block
    WouldBlock,
    /// The channel is a stream device and cannot seek
    NotSeekable,
    /// Operation on a closed channel
    BadDescriptor,

    // Configuration errors
    /// Unsupported word width or SPI mode
    InvalidFormat,
    /// Bus frequency of zero
    InvalidFrequency,
    /// Invalid channel configuration (buffer size or tx multiple)
    InvalidConfig,

    // Bus errors
    /// A word exchange on the SPI bus failed
    TransferFailed,
}

impl Error {
    /// Negative errno-style code for this error
    ///
    /// Codes are stable and match the POSIX values for the equivalent
    /// file-handle condition.
    pub const fn errno(&self) -> i32 {
        match self {
            Self::WouldBlock => -errno::EAGAIN,
            Self::NotSeekable => -errno::ESPIPE,
            Self::BadDescriptor => -errno::EBADF,
            Self::InvalidFormat | Self::InvalidFrequency | Self::InvalidConfig => -errno::EINVAL,
            Self::TransferFailed => -errno::EIO,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WouldBlock => write!(f, "operation would block"),
            Self::NotSeekable => write!(f, "device is not seekable"),
            Self::BadDescriptor => write!(f, "channel is closed"),
            Self::InvalidFormat => write!(f, "invalid SPI format"),
            Self::InvalidFrequency => write!(f, "invalid SPI frequency"),
            Self::InvalidConfig => write!(f, "invalid channel configuration"),
            Self::TransferFailed => write!(f, "SPI word transfer failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl embedded_io::Error for Error {
    fn kind(&self) -> embedded_io::ErrorKind {
        use embedded_io::ErrorKind;

        match self {
            Self::WouldBlock => ErrorKind::Other,
            Self::NotSeekable => ErrorKind::Unsupported,
            Self::BadDescriptor => ErrorKind::NotConnected,
            Self::InvalidFormat | Self::InvalidFrequency | Self::InvalidConfig => {
                ErrorKind::InvalidInput
            }
            Self::TransferFailed => ErrorKind::Other,
        }
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
