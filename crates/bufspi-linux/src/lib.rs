//! bufspi-linux - Linux spidev and GPIO backend
//!
//! This crate connects a [`BufferedSpiChannel`](bufspi_core::BufferedSpiChannel)
//! to real hardware on Linux: words are clocked through `/dev/spidevX.Y`
//! and the nss and data-ready lines are driven through the GPIO character
//! device (`/dev/gpiochipN`).
//!
//! # Usage with bufspi CLI
//!
//! ```bash
//! # ISM43362 on a Raspberry Pi: nss on GPIO8, data-ready on GPIO25
//! bufspi handshake -b linux:dev=/dev/spidev0.1,gpiochip=0,nss=8,drdy=25
//!
//! # Override the clock (kHz) and SPI mode
//! bufspi send -b linux:dev=/dev/spidev0.1,nss=8,drdy=25,spispeed=2000,mode=0 "AT"
//! ```
//!
//! # System Requirements
//!
//! - Linux kernel with spidev support enabled (`CONFIG_SPI_SPIDEV`)
//! - GPIO character device support (`CONFIG_GPIO_CDEV`)
//! - Read/write access to the spidev and gpiochip devices

pub mod error;
pub mod gpio;
pub mod spi;

// Re-exports
pub use error::{LinuxBusError, Result};
pub use gpio::LinuxGpioLines;
pub use spi::LinuxSpiBus;

use gpiocdev::line::Offset;

/// Hardware description of a Linux-attached module
#[derive(Debug, Clone, Default)]
pub struct LinuxConfig {
    /// spidev device path (e.g., "/dev/spidev0.1")
    pub spi_device: String,
    /// GPIO chip path (e.g., "/dev/gpiochip0")
    pub gpio_chip: String,
    /// nss line offset
    pub nss: Offset,
    /// data-ready line offset
    pub data_ready: Offset,
    /// Bus clock override in Hz
    pub speed_hz: Option<u32>,
    /// SPI mode override (0-3)
    pub mode: Option<u8>,
}

/// Open both halves of a Linux-attached module
pub fn open(config: &LinuxConfig) -> Result<(LinuxSpiBus, LinuxGpioLines)> {
    let bus = LinuxSpiBus::open(&config.spi_device)?;
    let lines = LinuxGpioLines::open(&config.gpio_chip, config.nss, config.data_ready)?;
    Ok((bus, lines))
}

/// Parse Linux backend options from a backend string
///
/// Recognised options:
///
/// - `dev=/dev/spidevX.Y` - Required: spidev device path
/// - `gpiochip=N` or `gpiodev=/dev/gpiochipN` - GPIO chip (default: 0)
/// - `nss=N` - Required: nss line offset
/// - `drdy=N` - Required: data-ready line offset
/// - `spispeed=kHz` - Optional: bus clock
/// - `mode=N` - Optional: SPI mode 0-3
pub fn parse_options(options: &[(&str, &str)]) -> std::result::Result<LinuxConfig, String> {
    let mut config = LinuxConfig {
        gpio_chip: "/dev/gpiochip0".to_string(),
        ..Default::default()
    };
    let mut have_nss = false;
    let mut have_drdy = false;

    for (key, value) in options {
        match *key {
            "dev" => {
                config.spi_device = value.to_string();
            }
            "gpiochip" => {
                let chip: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid gpiochip value: {}", value))?;
                config.gpio_chip = format!("/dev/gpiochip{}", chip);
            }
            "gpiodev" => {
                config.gpio_chip = value.to_string();
            }
            "nss" | "cs" => {
                config.nss = value
                    .parse()
                    .map_err(|_| format!("Invalid nss value: {}", value))?;
                have_nss = true;
            }
            "drdy" => {
                config.data_ready = value
                    .parse()
                    .map_err(|_| format!("Invalid drdy value: {}", value))?;
                have_drdy = true;
            }
            "spispeed" => {
                // Parse speed in kHz
                let speed_khz: u32 = value
                    .parse()
                    .map_err(|_| format!("Invalid spispeed value: {}", value))?;
                if speed_khz == 0 {
                    return Err("spispeed must be greater than 0".to_string());
                }
                config.speed_hz = Some(speed_khz * 1000);
            }
            "mode" => {
                let mode: u8 = value
                    .parse()
                    .map_err(|_| format!("Invalid mode value: {}", value))?;
                if mode > 3 {
                    return Err(format!("Invalid SPI mode: {} (must be 0-3)", mode));
                }
                config.mode = Some(mode);
            }
            _ => {
                log::warn!("linux: Unknown option: {}={}", key, value);
            }
        }
    }

    if config.spi_device.is_empty() {
        return Err("No device specified. Use dev=/dev/spidevX.Y".to_string());
    }
    if !have_nss {
        return Err("Missing required parameter: nss".to_string());
    }
    if !have_drdy {
        return Err("Missing required parameter: drdy".to_string());
    }

    Ok(config)
}
