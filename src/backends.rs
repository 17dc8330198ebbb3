//! Backend registration and dispatch
//!
//! This module provides a centralized registry for all backends, with support
//! for feature-gated inclusion and dynamic help text generation.

use bufspi_core::bus::WordExchange;
use bufspi_core::channel::{BufferedSpiChannel, ChannelConfig};
use bufspi_core::flow::FlowControlLine;

/// Channel type handed to commands, independent of the backend
pub type Channel = BufferedSpiChannel<'static, Box<dyn WordExchange>, Box<dyn FlowControlLine>>;

/// Information about a backend
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names/aliases
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Get information about all available backends (enabled at compile time)
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &[],
        description: "Emulated WiFi module for testing (echo=1,reply=<text>,prompt=1,accept=0)",
    });

    #[cfg(all(feature = "linux", target_os = "linux"))]
    backends.push(BackendInfo {
        name: "linux",
        aliases: &["spidev"],
        description: "Linux spidev + GPIO (dev=/dev/spidevX.Y,gpiochip=N,nss=N,drdy=N,spispeed=<kHz>,mode=<0-3>)",
    });

    backends
}

/// Generate help text listing all available backends
pub fn backend_help() -> String {
    let backends = available_backends();

    if backends.is_empty() {
        return "No backends available (recompile with backend features enabled)".to_string();
    }

    let mut help = String::from("Available backends:\n");
    for b in &backends {
        help.push_str(&format!("  {:8} - {}\n", b.name, b.description));
        if !b.aliases.is_empty() {
            help.push_str(&format!("  {:8}   aliases: {}\n", "", b.aliases.join(", ")));
        }
    }
    help
}

/// Check if a backend name matches any available backend
fn find_backend(name: &str) -> Option<&'static str> {
    available_backends()
        .into_iter()
        .find(|b| b.name == name || b.aliases.contains(&name))
        .map(|b| b.name)
}

/// Open the named backend, build a channel on it and pass it to `f`
///
/// The channel is closed once `f` returns, whatever the outcome.
pub fn with_channel<F>(
    backend: &str,
    config: ChannelConfig,
    f: F,
) -> Result<(), Box<dyn std::error::Error>>
where
    F: FnOnce(&mut Channel) -> Result<(), Box<dyn std::error::Error>>,
{
    let (name, options) = parse_backend_string(backend);

    let canonical_name = match find_backend(name) {
        Some(n) => n,
        None => return Err(unknown_backend_error(name)),
    };

    #[allow(unused_mut)]
    let mut config = config;

    let (bus, lines): (Box<dyn WordExchange>, Box<dyn FlowControlLine>) = match canonical_name {
        #[cfg(feature = "dummy")]
        "dummy" => {
            use bufspi_dummy::{parse_options, DummyModule};

            let dummy_config = parse_options(&options)
                .map_err(|e| format!("Invalid dummy parameters: {}", e))?;
            let module = DummyModule::new(dummy_config);
            let (bus, lines) = module.split();
            (Box::new(bus), Box::new(lines))
        }

        #[cfg(all(feature = "linux", target_os = "linux"))]
        "linux" => {
            use bufspi_linux::parse_options;

            let linux_config = parse_options(&options)
                .map_err(|e| format!("Invalid linux parameters: {}", e))?;
            if let Some(hz) = linux_config.speed_hz {
                config = config.with_frequency(hz);
            }
            if let Some(mode) = linux_config.mode {
                let format = bufspi_core::bus::BusFormat::new(config.format.width.bits(), mode)?;
                config = config.with_bus_format(format);
            }

            log::info!("Opening {} ...", linux_config.spi_device);
            let (bus, lines) = bufspi_linux::open(&linux_config).map_err(|e| {
                format!(
                    "Failed to open linux backend: {}\nMake sure the devices exist and you have permissions.",
                    e
                )
            })?;
            (Box::new(bus), Box::new(lines))
        }

        _ => return Err(unknown_backend_error(name)),
    };

    let mut channel = BufferedSpiChannel::new(bus, lines, config.with_name(canonical_name))?;
    let result = f(&mut channel);

    let stats = channel.stats();
    log::debug!(
        "{}: {} cycles ({} failed), {} words, tx {} bytes, rx {} bytes, {} tx / {} rx overwritten",
        canonical_name,
        stats.cycles,
        stats.failed_cycles,
        stats.words_exchanged,
        stats.tx_bytes,
        stats.rx_bytes,
        stats.tx_overwritten,
        stats.rx_overwritten
    );
    channel.close()?;
    result
}

/// Parse a backend string into name and options
///
/// Format: "name" or "name:option1=value1,option2=value2"
pub fn parse_backend_string(s: &str) -> (&str, Vec<(&str, &str)>) {
    if let Some((name, opts)) = s.split_once(':') {
        let options: Vec<_> = opts
            .split(',')
            .filter_map(|opt| opt.split_once('='))
            .collect();
        (name, options)
    } else {
        (s, Vec::new())
    }
}

fn unknown_backend_error(name: &str) -> Box<dyn std::error::Error> {
    let mut msg = format!("Unknown backend: {}\n\n", name);
    msg.push_str(&backend_help());
    msg.push_str("\nUse 'bufspi list-backends' for more details");
    msg.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_string() {
        assert_eq!(parse_backend_string("dummy"), ("dummy", vec![]));
        assert_eq!(
            parse_backend_string("linux:dev=/dev/spidev0.1,nss=8,drdy=25"),
            (
                "linux",
                vec![("dev", "/dev/spidev0.1"), ("nss", "8"), ("drdy", "25")]
            )
        );
    }

    #[test]
    fn test_unknown_backend() {
        let result = with_channel("nope", ChannelConfig::default(), |_| Ok(()));
        assert!(result.is_err());
    }

    #[cfg(feature = "dummy")]
    #[test]
    fn test_dummy_backend_round_trip() {
        let config = ChannelConfig::default()
            .with_format(16, 0)
            .with_blocking(false)
            .with_nss_settle_us(0);
        with_channel("dummy:echo=1", config, |spi| {
            spi.puts("AT")?;
            let mut buf = [0u8; 16];
            let n = spi.read(&mut buf)?;
            assert_eq!(&buf[..n], b"AT\n\n");
            Ok(())
        })
        .unwrap();
    }
}
