//! bufspi - Serial-over-SPI link tool
//!
//! Talks to WiFi co-processors such as the ISM43362 that expose a serial
//! AT command interface over SPI, with a data-ready line telling the host
//! when the module wants to be clocked.
//!
//! # Architecture
//!
//! Every command runs on a `BufferedSpiChannel` from `bufspi-core`, built on
//! one of the backends:
//! - **linux** - spidev for the words, GPIO character device for nss and
//!   data-ready
//! - **dummy** - an in-memory module model for testing without hardware

mod backends;
mod cli;
mod commands;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logger
    logger(cli.verbose).init();

    match cli.command {
        Commands::Handshake {
            channel,
            timeout_ms,
        } => {
            let config = commands::channel_config(&channel)?;
            backends::with_channel(&channel.backend, config, |spi| {
                commands::run_handshake(spi, Duration::from_millis(timeout_ms))
            })
        }
        Commands::Send { channel, text, cr } => {
            let config = commands::channel_config(&channel)?;
            let text = text.join(" ");
            backends::with_channel(&channel.backend, config, |spi| {
                commands::run_send(spi, &text, cr)
            })
        }
        Commands::Recv {
            channel,
            idle_ms,
            max,
            hex,
        } => {
            let config = commands::channel_config(&channel)?;
            backends::with_channel(&channel.backend, config, |spi| {
                commands::run_recv(spi, Duration::from_millis(idle_ms), max, hex)
            })
        }
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
    }
}

/// Logger with the default `info` filter, raised by -v (debug) or -vv (trace)
fn logger(verbose: u8) -> env_logger::Builder {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    match verbose {
        0 => {} // default (info)
        1 => {
            builder.filter_level(log::LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
        }
    }
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_filter() {
        assert!(logger(1).build().filter() >= log::LevelFilter::Debug);
        assert_eq!(logger(2).build().filter(), log::LevelFilter::Trace);
        assert_eq!(logger(5).build().filter(), log::LevelFilter::Trace);
    }
}
