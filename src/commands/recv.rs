//! Receive command implementation

use std::io::Write;
use std::time::{Duration, Instant};

use bufspi_core::bus::WordExchange;
use bufspi_core::channel::BufferedSpiChannel;
use bufspi_core::flow::FlowControlLine;
use bufspi_core::Error;
use indicatif::{ProgressBar, ProgressStyle};

use super::POLL_INTERVAL;

/// Bytes per line of hex output
const HEX_LINE: usize = 16;

/// Receive from the module until it goes quiet and print what arrived
pub fn run_recv<S: WordExchange, L: FlowControlLine>(
    spi: &mut BufferedSpiChannel<'_, S, L>,
    idle: Duration,
    max: Option<usize>,
    hex: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let data = receive(spi, idle, max, &pb)?;
    pb.finish_and_clear();

    if hex {
        print!("{}", format_hex(&data));
    } else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&data)?;
        stdout.flush()?;
    }
    log::info!("Received {} bytes", data.len());
    Ok(())
}

/// Read until nothing arrives for `idle`, or `max` bytes are collected
pub(crate) fn receive<S: WordExchange, L: FlowControlLine>(
    spi: &mut BufferedSpiChannel<'_, S, L>,
    idle: Duration,
    max: Option<usize>,
    pb: &ProgressBar,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = Vec::new();
    let mut buf = [0u8; 64];
    let mut last_rx = Instant::now();

    loop {
        let want = match max {
            Some(max) if data.len() >= max => break,
            Some(max) => (max - data.len()).min(buf.len()),
            None => buf.len(),
        };

        match spi.try_read(&mut buf[..want]) {
            Ok(n) => {
                data.extend_from_slice(&buf[..n]);
                last_rx = Instant::now();
                pb.set_message(format!("{} bytes", data.len()));
            }
            Err(Error::WouldBlock) => {
                if last_rx.elapsed() >= idle {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(data)
}

/// Render bytes as offset-prefixed hex lines
pub(crate) fn format_hex(data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(HEX_LINE).enumerate() {
        let bytes: Vec<String> = line.iter().map(|b| format!("{:02X}", b)).collect();
        out.push_str(&format!("{:04X}: {}\n", i * HEX_LINE, bytes.join(" ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufspi_core::channel::ChannelConfig;
    use bufspi_dummy::{DummyConfig, DummyModule};

    fn channel(
        module: &DummyModule,
        bits: u8,
    ) -> BufferedSpiChannel<'static, bufspi_dummy::DummyBus, bufspi_dummy::DummyLines> {
        let (bus, lines) = module.split();
        let config = ChannelConfig::default()
            .with_format(bits, 0)
            .with_blocking(false);
        BufferedSpiChannel::new(bus, lines, config).unwrap()
    }

    #[test]
    fn test_receive_until_idle() {
        let module = DummyModule::new(DummyConfig::default());
        module.peer_mut().queue_response(b"+OK\r\n");
        let mut spi = channel(&module, 8);

        let data = receive(&mut spi, Duration::from_millis(5), None, &ProgressBar::hidden()).unwrap();
        assert_eq!(data, b"+OK\r\n");
    }

    #[test]
    fn test_receive_strips_trailing_filler() {
        let module = DummyModule::new(DummyConfig::default());
        module.peer_mut().queue_response(b"OK\r\n> ");
        module.peer_mut().queue_response(b"!");
        let mut spi = channel(&module, 16);

        let data = receive(&mut spi, Duration::from_millis(5), None, &ProgressBar::hidden()).unwrap();
        assert_eq!(data, b"OK\r\n> !");
    }

    #[test]
    fn test_receive_stops_at_max() {
        let module = DummyModule::new(DummyConfig::default());
        module.peer_mut().queue_response(b"0123456789");
        let mut spi = channel(&module, 8);

        let data =
            receive(&mut spi, Duration::from_secs(5), Some(4), &ProgressBar::hidden()).unwrap();
        assert_eq!(data, b"0123");
        assert_eq!(spi.rx_available(), 6);
    }

    #[test]
    fn test_receive_nothing() {
        let module = DummyModule::new(DummyConfig::default());
        let mut spi = channel(&module, 8);

        let data = receive(&mut spi, Duration::from_millis(2), None, &ProgressBar::hidden()).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(b""), "");
        assert_eq!(format_hex(b"AT\r\n"), "0000: 41 54 0D 0A\n");

        let data: Vec<u8> = (0..18).collect();
        let text = format_hex(&data);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "0010: 10 11");
    }
}
