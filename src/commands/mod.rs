//! CLI command implementations
//!
//! Commands are generic over the bus and line types so they run the same
//! way on a boxed backend channel and on a dummy module in tests. The CLI
//! opens every channel in non-blocking mode and applies its own timeouts.

mod handshake;
mod list;
mod recv;
mod send;

pub use handshake::run_handshake;
pub use list::list_backends;
pub use recv::run_recv;
pub use send::run_send;

use std::time::{Duration, Instant};

use bufspi_core::bus::{BusFormat, WordExchange};
use bufspi_core::channel::{BufferedSpiChannel, ChannelConfig};
use bufspi_core::flow::FlowControlLine;
use bufspi_core::Error;

use crate::cli::ChannelArgs;

/// Interval between attempts while waiting on the module
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Build the channel configuration from command line options
pub fn channel_config(args: &ChannelArgs) -> Result<ChannelConfig, Box<dyn std::error::Error>> {
    let format = BusFormat::new(args.bits, args.mode)?;
    let config = ChannelConfig::default()
        .with_buffers(args.buf_size, args.tx_multiple)
        .with_frequency(args.frequency)
        .with_bus_format(format)
        .with_blocking(false);
    config.validate()?;
    Ok(config)
}

/// Send everything buffered, giving up after `timeout`
fn flush_with_timeout<S: WordExchange, L: FlowControlLine>(
    spi: &mut BufferedSpiChannel<'_, S, L>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    loop {
        match spi.flush() {
            Ok(()) => return Ok(()),
            Err(Error::WouldBlock) => {
                if start.elapsed() >= timeout {
                    return Err(format!(
                        "Module not ready: {} bytes still buffered after {} ms",
                        spi.tx_pending(),
                        timeout.as_millis()
                    )
                    .into());
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }
}
