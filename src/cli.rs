//! CLI argument parsing

use clap::{Parser, Subcommand};

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a word width, accepting only 8 or 16
fn parse_bits(s: &str) -> Result<u8, String> {
    match s {
        "8" => Ok(8),
        "16" => Ok(16),
        _ => Err(format!("Invalid word width: {} (must be 8 or 16)", s)),
    }
}

#[derive(Parser)]
#[command(name = "bufspi")]
#[command(author, version, about = "Serial-over-SPI link tool for WiFi modules", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Channel options shared across commands
#[derive(clap::Args, Debug, Clone)]
pub struct ChannelArgs {
    /// Backend to use, e.g. "dummy:echo=1" or
    /// "linux:dev=/dev/spidev0.1,gpiochip=0,nss=8,drdy=25"
    #[arg(short, long)]
    pub backend: String,

    /// Bits per SPI word (8 or 16)
    #[arg(long, default_value = "16", value_parser = parse_bits)]
    pub bits: u8,

    /// SPI mode (0-3)
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    pub mode: u8,

    /// Bus clock in Hz (hex or decimal)
    #[arg(long, default_value = "10000000", value_parser = parse_hex_u32)]
    pub frequency: u32,

    /// printf buffer size in bytes; also the rx buffer capacity
    #[arg(long, default_value_t = bufspi_core::channel::DEFAULT_BUF_SIZE)]
    pub buf_size: usize,

    /// Number of printf buffers the tx buffer holds
    #[arg(long, default_value_t = bufspi_core::channel::DEFAULT_TX_MULTIPLE)]
    pub tx_multiple: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the module start-up handshake and check its prompt
    Handshake {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Give up after this many milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },

    /// Send text to the module
    Send {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Text to send; arguments are joined with spaces
        #[arg(required = true)]
        text: Vec<String>,

        /// Terminate with "\r" instead of a newline
        #[arg(long)]
        cr: bool,
    },

    /// Receive data from the module and print it
    Recv {
        #[command(flatten)]
        channel: ChannelArgs,

        /// Stop after this many milliseconds without data
        #[arg(long, default_value_t = 1000)]
        idle_ms: u64,

        /// Stop after this many bytes
        #[arg(long)]
        max: Option<usize>,

        /// Print received bytes as hex
        #[arg(long)]
        hex: bool,
    },

    /// List available backends
    ListBackends,
}
