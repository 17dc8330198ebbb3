//! Channel configuration

use crate::bus::{BusConfig, BusFormat};
use crate::error::{Error, Result};

/// Default printf buffer size (rx capacity) in bytes
pub const DEFAULT_BUF_SIZE: usize = 384;

/// Default number of printf buffers the tx ring may hold
pub const DEFAULT_TX_MULTIPLE: usize = 4;

/// Default bus clock (1 MHz)
pub const DEFAULT_FREQUENCY_HZ: u32 = 1_000_000;

/// Byte used to complete an odd tail in 16-bit format
pub const DEFAULT_PAD_BYTE: u8 = b'\n';

/// High byte the peer uses to pad its last 16-bit word
pub const DEFAULT_TRAILING_FILLER: u8 = 0x15;

/// Settle time after a manual nss change (10 ms)
pub const DEFAULT_NSS_SETTLE_US: u32 = 10_000;

/// Poll interval of blocking operations (100 us)
pub const DEFAULT_POLL_INTERVAL_US: u32 = 100;

/// Configuration for a [`BufferedSpiChannel`](super::BufferedSpiChannel)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// printf buffer size; also the rx ring capacity
    pub buf_size: usize,
    /// Number of printf buffers held by the tx ring (tx capacity is
    /// `buf_size * tx_multiple`)
    pub tx_multiple: usize,
    /// Bus clock in Hz
    pub frequency_hz: u32,
    /// Word width and SPI mode
    pub format: BusFormat,
    /// High half of the last tx word when an odd number of bytes remains
    pub pad_byte: u8,
    /// High byte dropped from the last rx word of a reception
    pub trailing_filler: Option<u8>,
    /// Reads and printf block until they can make progress
    pub blocking: bool,
    /// Delay between attempts of a blocking operation
    pub poll_interval_us: u32,
    /// Delay after a manual nss change
    pub nss_settle_us: u32,
    /// Optional name used in log messages
    pub name: Option<&'static str>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            buf_size: DEFAULT_BUF_SIZE,
            tx_multiple: DEFAULT_TX_MULTIPLE,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            format: BusFormat::default(),
            pad_byte: DEFAULT_PAD_BYTE,
            trailing_filler: Some(DEFAULT_TRAILING_FILLER),
            blocking: true,
            poll_interval_us: DEFAULT_POLL_INTERVAL_US,
            nss_settle_us: DEFAULT_NSS_SETTLE_US,
            name: None,
        }
    }
}

impl ChannelConfig {
    /// Set the printf buffer size and tx multiple
    pub fn with_buffers(mut self, buf_size: usize, tx_multiple: usize) -> Self {
        self.buf_size = buf_size;
        self.tx_multiple = tx_multiple;
        self
    }

    /// Set the bus clock in Hz
    pub fn with_frequency(mut self, hz: u32) -> Self {
        self.frequency_hz = hz;
        self
    }

    /// Set word width (8 or 16) and SPI mode (0-3)
    ///
    /// Invalid values leave the format unchanged and log a warning. Build
    /// the format with `BusFormat::new` and pass it to
    /// [`with_bus_format`](Self::with_bus_format) to handle the error.
    pub fn with_format(mut self, bits: u8, mode: u8) -> Self {
        match BusFormat::new(bits, mode) {
            Ok(format) => self.format = format,
            Err(_) => log::warn!("bufspi: ignoring invalid format {} bits mode {}", bits, mode),
        }
        self
    }

    /// Set a pre-validated bus format
    pub fn with_bus_format(mut self, format: BusFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the pad byte for odd 16-bit tails
    pub fn with_pad_byte(mut self, pad: u8) -> Self {
        self.pad_byte = pad;
        self
    }

    /// Set or disable the trailing rx filler byte
    pub fn with_trailing_filler(mut self, filler: Option<u8>) -> Self {
        self.trailing_filler = filler;
        self
    }

    /// Select blocking or non-blocking mode
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Set the poll interval of blocking operations
    pub fn with_poll_interval_us(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }

    /// Set the settle delay after manual nss changes
    pub fn with_nss_settle_us(mut self, us: u32) -> Self {
        self.nss_settle_us = us;
        self
    }

    /// Set the channel name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    /// Capacity of the tx ring in bytes
    pub fn tx_capacity(&self) -> usize {
        self.buf_size.saturating_mul(self.tx_multiple)
    }

    /// Bus settings derived from this configuration
    pub fn bus(&self) -> BusConfig {
        BusConfig {
            frequency_hz: self.frequency_hz,
            format: self.format,
        }
    }

    /// Check the configuration before building a channel
    pub fn validate(&self) -> Result<()> {
        if self.buf_size == 0 || self.tx_multiple == 0 {
            return Err(Error::InvalidConfig);
        }
        if self.buf_size.checked_mul(self.tx_multiple).is_none() {
            return Err(Error::InvalidConfig);
        }
        if self.frequency_hz == 0 {
            return Err(Error::InvalidFrequency);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::WordWidth;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();
        assert_eq!(config.buf_size, 384);
        assert_eq!(config.tx_multiple, 4);
        assert_eq!(config.tx_capacity(), 1536);
        assert!(config.blocking);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ChannelConfig::default()
            .with_buffers(8, 1)
            .with_format(16, 0)
            .with_frequency(10_000_000)
            .with_name("wifi");
        assert_eq!(config.tx_capacity(), 8);
        assert_eq!(config.format.width, WordWidth::Bits16);
        assert_eq!(config.bus().frequency_hz, 10_000_000);
        assert_eq!(config.name, Some("wifi"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero = ChannelConfig::default().with_buffers(0, 4);
        assert_eq!(zero.validate(), Err(Error::InvalidConfig));

        let no_tx = ChannelConfig::default().with_buffers(16, 0);
        assert_eq!(no_tx.validate(), Err(Error::InvalidConfig));

        let slow = ChannelConfig::default().with_frequency(0);
        assert_eq!(slow.validate(), Err(Error::InvalidFrequency));
    }
}
