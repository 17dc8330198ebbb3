//! Send command implementation

use std::time::Duration;

use bufspi_core::bus::WordExchange;
use bufspi_core::channel::BufferedSpiChannel;
use bufspi_core::flow::FlowControlLine;

use super::flush_with_timeout;

/// How long the module may hold off before buffered text is abandoned
const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Send `text` to the module
///
/// The text is terminated with "\r" when `cr` is set, with a newline
/// otherwise, and the tx buffer is flushed before returning.
pub fn run_send<S: WordExchange, L: FlowControlLine>(
    spi: &mut BufferedSpiChannel<'_, S, L>,
    text: &str,
    cr: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let queued = if cr {
        spi.printf(format_args!("{}\r", text))?
    } else {
        spi.puts(text)?
    };
    log::debug!("send: queued {} bytes", queued);

    flush_with_timeout(spi, SEND_TIMEOUT)?;
    println!("Sent {} bytes", queued);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufspi_core::channel::ChannelConfig;
    use bufspi_dummy::{DummyConfig, DummyModule};

    fn channel(
        module: &DummyModule,
    ) -> BufferedSpiChannel<'static, bufspi_dummy::DummyBus, bufspi_dummy::DummyLines> {
        let (bus, lines) = module.split();
        let config = ChannelConfig::default()
            .with_format(8, 0)
            .with_blocking(false);
        BufferedSpiChannel::new(bus, lines, config).unwrap()
    }

    #[test]
    fn test_send_with_newline() {
        let module = DummyModule::new(DummyConfig::default());
        let mut spi = channel(&module);

        run_send(&mut spi, "AT", false).unwrap();
        assert_eq!(module.peer().transactions(), &[b"AT\n".to_vec()]);
        assert_eq!(spi.tx_pending(), 0);
    }

    #[test]
    fn test_send_with_cr() {
        let module = DummyModule::new(DummyConfig::default());
        let mut spi = channel(&module);

        run_send(&mut spi, "I?", true).unwrap();
        assert_eq!(module.peer().transactions(), &[b"I?\r".to_vec()]);
    }

    #[test]
    fn test_send_to_busy_module_fails() {
        let module = DummyModule::new(DummyConfig::default().with_accepting(false));
        let mut spi = channel(&module);

        // Nothing buffered yet
        assert!(flush_with_timeout(&mut spi, Duration::ZERO).is_ok());

        spi.puts("AT").unwrap();
        assert!(flush_with_timeout(&mut spi, Duration::from_millis(5)).is_err());
        assert!(module.peer().transactions().is_empty());
        assert_eq!(spi.tx_pending(), 3);
    }
}
