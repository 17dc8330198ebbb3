//! bufspi-core - Buffered serial-over-SPI transport
//!
//! This crate turns a byte-synchronous, half-duplex SPI link to a
//! peripheral module (for example a WiFi co-processor) into a stream with
//! POSIX-like semantics. The peripheral signals pending data on a dedicated
//! data-ready line and is addressed through a chip-select (nss) line.
//!
//! It is `no_std` and only needs `alloc` for the ring buffer storage.
//!
//! # Architecture
//!
//! - [`ring::RingBuffer`] - fixed-capacity circular queue with an
//!   overwrite-oldest policy
//! - [`flow::FlowControlLine`] - nss output and data-ready input
//! - [`bus::WordExchange`] - one full-duplex SPI word transfer
//! - [`irq::InterruptBridge`] - RxIrq/TxIrq callback slots and arming
//! - [`channel::BufferedSpiChannel`] - owns all of the above and runs the
//!   transfer state machine
//! - [`shared::SharedChannel`] - critical-section wrapper for sharing a
//!   channel between application code and an interrupt handler
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for [`Error`] and use the host
//!   critical-section implementation
//!
//! # Example
//!
//! ```ignore
//! use bufspi_core::channel::{BufferedSpiChannel, ChannelConfig};
//!
//! let config = ChannelConfig::default().with_format(16, 0);
//! let mut spi = BufferedSpiChannel::new(bus, lines, config)?;
//!
//! spi.puts("AT")?;
//! let mut reply = [0u8; 64];
//! let n = spi.read(&mut reply)?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bus;
pub mod channel;
pub mod error;
pub mod flow;
pub mod irq;
pub mod ring;
pub mod shared;
pub mod stream;

pub use bus::{BusFormat, SpiMode, WordExchange, WordWidth};
pub use channel::{BufferedSpiChannel, ChannelConfig, ChannelState, ChannelStats};
pub use error::{Error, Result};
pub use flow::FlowControlLine;
pub use irq::IrqType;
pub use shared::SharedChannel;
pub use stream::{ByteStream, ConfigurableBus};
