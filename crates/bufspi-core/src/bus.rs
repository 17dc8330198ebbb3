//! SPI word exchange and bus format
//!
//! [`WordExchange`] is the only primitive that touches the physical bus.
//! Everything above it (packing bytes into words, flow control, buffering)
//! lives in the channel.

use crate::error::{Error, Result};

/// Width of one SPI transfer unit
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum WordWidth {
    /// One byte per word
    #[default]
    Bits8,
    /// Two bytes per word, first byte in the low half
    Bits16,
}

impl WordWidth {
    /// Number of bits per word
    pub const fn bits(&self) -> u8 {
        match self {
            Self::Bits8 => 8,
            Self::Bits16 => 16,
        }
    }

    /// Number of bytes carried by one word
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Bits8 => 1,
            Self::Bits16 => 2,
        }
    }
}

impl TryFrom<u8> for WordWidth {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self> {
        match bits {
            8 => Ok(Self::Bits8),
            16 => Ok(Self::Bits16),
            _ => Err(Error::InvalidFormat),
        }
    }
}

/// SPI mode (clock polarity and phase)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Mode number as used by spidev and most HALs (0-3)
    pub const fn number(&self) -> u8 {
        match self {
            Self::Mode0 => 0,
            Self::Mode1 => 1,
            Self::Mode2 => 2,
            Self::Mode3 => 3,
        }
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(Self::Mode0),
            1 => Ok(Self::Mode1),
            2 => Ok(Self::Mode2),
            3 => Ok(Self::Mode3),
            _ => Err(Error::InvalidFormat),
        }
    }
}

/// Word width and SPI mode
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BusFormat {
    /// Bits per word
    pub width: WordWidth,
    /// Clock polarity and phase
    pub mode: SpiMode,
}

impl BusFormat {
    /// Build a format from raw bit count and mode number
    ///
    /// Fails with [`Error::InvalidFormat`] for anything other than 8/16 bits
    /// and modes 0-3.
    pub fn new(bits: u8, mode: u8) -> Result<Self> {
        Ok(Self {
            width: WordWidth::try_from(bits)?,
            mode: SpiMode::try_from(mode)?,
        })
    }
}

/// Full bus configuration applied to a [`WordExchange`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusConfig {
    /// Clock frequency in Hz
    pub frequency_hz: u32,
    /// Word width and mode
    pub format: BusFormat,
}

/// One full-duplex SPI word transfer
///
/// Implementations must be configured through [`set_frequency`] and
/// [`set_format`] before the first exchange; the channel does this at
/// construction.
///
/// [`set_frequency`]: WordExchange::set_frequency
/// [`set_format`]: WordExchange::set_format
pub trait WordExchange {
    /// Set the clock frequency in Hz
    fn set_frequency(&mut self, hz: u32) -> Result<()>;

    /// Set the word width and SPI mode
    fn set_format(&mut self, format: BusFormat) -> Result<()>;

    /// Clock out `out` and return the word received meanwhile
    ///
    /// Only the low 8 bits are meaningful in 8-bit format. A failed
    /// exchange must not be treated as having delivered a word.
    fn exchange_word(&mut self, out: u16) -> Result<u16>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

// Blanket impl for boxed buses to allow trait objects
impl<B: WordExchange + ?Sized> WordExchange for alloc::boxed::Box<B> {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        (**self).set_frequency(hz)
    }

    fn set_format(&mut self, format: BusFormat) -> Result<()> {
        (**self).set_format(format)
    }

    fn exchange_word(&mut self, out: u16) -> Result<u16> {
        (**self).exchange_word(out)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}
