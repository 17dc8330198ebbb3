//! spidev word exchange
//!
//! `LinuxSpiBus` clocks one word per `SPI_IOC_MESSAGE(1)` ioctl. Chip
//! select is driven separately through a GPIO line (see
//! [`crate::gpio`]), so the spidev device should be one whose own CS is
//! unused or not wired to the module.

use crate::error::{LinuxBusError, Result};

use bufspi_core::bus::{BusFormat, WordExchange, WordWidth};
use bufspi_core::error::{Error as CoreError, Result as CoreResult};

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// Linux spidev ioctl constants
mod ioctl {
    use nix::ioctl_write_ptr;

    // SPI ioctl magic number
    const SPI_IOC_MAGIC: u8 = b'k';

    // SPI ioctl type numbers
    const SPI_IOC_TYPE_MODE: u8 = 1;
    const SPI_IOC_TYPE_BITS_PER_WORD: u8 = 3;
    const SPI_IOC_TYPE_MAX_SPEED_HZ: u8 = 4;

    ioctl_write_ptr!(spi_ioc_wr_mode, SPI_IOC_MAGIC, SPI_IOC_TYPE_MODE, u8);
    ioctl_write_ptr!(
        spi_ioc_wr_bits_per_word,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_BITS_PER_WORD,
        u8
    );
    ioctl_write_ptr!(
        spi_ioc_wr_max_speed_hz,
        SPI_IOC_MAGIC,
        SPI_IOC_TYPE_MAX_SPEED_HZ,
        u32
    );

    /// Size of spi_ioc_transfer struct
    pub const SPI_IOC_TRANSFER_SIZE: usize = 32;

    /// Calculate ioctl number for SPI_IOC_MESSAGE(n)
    pub fn spi_ioc_message(n: u8) -> libc::c_ulong {
        let size = (n as usize) * SPI_IOC_TRANSFER_SIZE;
        // _IOC(_IOC_WRITE, type, nr, size) with _IOC_WRITE = 1 and nr = 0
        ((1u32 << 30) | ((size as u32) << 16) | ((SPI_IOC_MAGIC as u32) << 8)) as libc::c_ulong
    }
}

/// SPI transfer structure for ioctl
/// This must match the kernel's struct spi_ioc_transfer layout
#[repr(C)]
#[derive(Debug, Default, Clone)]
struct SpiIocTransfer {
    tx_buf: u64,          // __u64 tx_buf
    rx_buf: u64,          // __u64 rx_buf
    len: u32,             // __u32 len
    speed_hz: u32,        // __u32 speed_hz
    delay_usecs: u16,     // __u16 delay_usecs
    bits_per_word: u8,    // __u8 bits_per_word
    cs_change: u8,        // __u8 cs_change
    tx_nbits: u8,         // __u8 tx_nbits
    rx_nbits: u8,         // __u8 rx_nbits
    word_delay_usecs: u8, // __u8 word_delay_usecs
    _pad: u8,             // padding
}

/// Word-at-a-time SPI bus on a spidev device
pub struct LinuxSpiBus {
    file: File,
    path: String,
    speed_hz: u32,
    width: WordWidth,
    mode: u8,
}

impl LinuxSpiBus {
    /// Open a spidev device
    ///
    /// The bus is not configured until [`set_speed`](Self::set_speed) and
    /// [`set_word_format`](Self::set_word_format) are called; a channel does
    /// both when it is created.
    pub fn open(device: &str) -> Result<Self> {
        if device.is_empty() {
            return Err(LinuxBusError::NoDevice);
        }

        log::debug!("linux_spi: Opening device {}", device);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(device)
            .map_err(|e| LinuxBusError::OpenFailed {
                path: device.to_string(),
                source: e,
            })?;

        Ok(Self {
            file,
            path: device.to_string(),
            speed_hz: 0,
            width: WordWidth::Bits8,
            mode: 0,
        })
    }

    /// Device path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get current speed setting
    pub fn speed_hz(&self) -> u32 {
        self.speed_hz
    }

    /// Set a new SPI clock speed
    pub fn set_speed(&mut self, speed_hz: u32) -> Result<()> {
        let fd = self.file.as_raw_fd();
        unsafe {
            ioctl::spi_ioc_wr_max_speed_hz(fd, &speed_hz).map_err(|e| {
                LinuxBusError::SetSpeedFailed {
                    speed: speed_hz,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }
        self.speed_hz = speed_hz;
        log::debug!("linux_spi: Set speed to {} Hz", speed_hz);
        Ok(())
    }

    /// Set SPI mode and bits per word
    pub fn set_word_format(&mut self, format: BusFormat) -> Result<()> {
        let fd = self.file.as_raw_fd();

        let mode = format.mode.number();
        unsafe {
            ioctl::spi_ioc_wr_mode(fd, &mode).map_err(|e| LinuxBusError::SetModeFailed {
                mode,
                source: std::io::Error::from_raw_os_error(e as i32),
            })?;
        }

        let bits = format.width.bits();
        unsafe {
            ioctl::spi_ioc_wr_bits_per_word(fd, &bits).map_err(|e| {
                LinuxBusError::SetBitsPerWordFailed {
                    bits,
                    source: std::io::Error::from_raw_os_error(e as i32),
                }
            })?;
        }

        self.mode = mode;
        self.width = format.width;
        log::debug!("linux_spi: Set mode {} with {} bits per word", mode, bits);
        Ok(())
    }

    /// Clock one word
    ///
    /// Words wider than 8 bits are stored in native byte order, as spidev
    /// expects.
    pub fn transfer_word(&mut self, out: u16) -> Result<u16> {
        let fd = self.file.as_raw_fd();
        let len = self.width.bytes();

        // 8-bit words only use the first byte
        let tx = match self.width {
            WordWidth::Bits8 => [out as u8, 0],
            WordWidth::Bits16 => out.to_ne_bytes(),
        };
        let mut rx = [0u8; 2];

        let transfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: len as u32,
            speed_hz: self.speed_hz,
            bits_per_word: self.width.bits(),
            ..Default::default()
        };

        let ret = unsafe { libc::ioctl(fd, ioctl::spi_ioc_message(1), &transfer) };
        if ret < 0 {
            return Err(LinuxBusError::TransferFailed(
                std::io::Error::last_os_error(),
            ));
        }

        Ok(match self.width {
            WordWidth::Bits8 => rx[0] as u16,
            WordWidth::Bits16 => u16::from_ne_bytes(rx),
        })
    }
}

impl WordExchange for LinuxSpiBus {
    fn set_frequency(&mut self, hz: u32) -> CoreResult<()> {
        self.set_speed(hz).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::InvalidFrequency
        })
    }

    fn set_format(&mut self, format: BusFormat) -> CoreResult<()> {
        self.set_word_format(format).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::InvalidFormat
        })
    }

    fn exchange_word(&mut self, out: u16) -> CoreResult<u16> {
        self.transfer_word(out).map_err(|e| {
            log::error!("linux_spi: {}", e);
            CoreError::TransferFailed
        })
    }

    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(Duration::from_micros(us as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_struct_matches_kernel_layout() {
        assert_eq!(
            std::mem::size_of::<SpiIocTransfer>(),
            ioctl::SPI_IOC_TRANSFER_SIZE
        );
    }

    #[test]
    fn test_spi_ioc_message_number() {
        // SPI_IOC_MESSAGE(1) == _IOW('k', 0, char[32])
        assert_eq!(ioctl::spi_ioc_message(1), 0x4020_6b00);
    }

    #[test]
    fn test_open_requires_device() {
        assert!(matches!(LinuxSpiBus::open(""), Err(LinuxBusError::NoDevice)));
    }
}
