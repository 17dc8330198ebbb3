//! Handshake command implementation
//!
//! After reset the module raises data-ready and, with nss held low, clocks
//! out a prompt of 16-bit words. Reading it confirms the SPI link works.

use std::time::{Duration, Instant};

use bufspi_core::bus::WordExchange;
use bufspi_core::channel::BufferedSpiChannel;
use bufspi_core::flow::FlowControlLine;

use super::POLL_INTERVAL;

/// Prompt words sent by the module after reset: filler, "\r\n", "> "
pub const PROMPT_WORDS: [u16; 3] = [0x1515, 0x0A0D, 0x203E];

/// Module handshake clock
const HANDSHAKE_FREQUENCY_HZ: u32 = 10_000_000;

/// Upper bound on prompt words read before giving up on data-ready
const MAX_PROMPT_WORDS: usize = 64;

/// Returns true if `words` start with the module prompt
pub fn is_prompt(words: &[u16]) -> bool {
    words.starts_with(&PROMPT_WORDS)
}

/// Read the start-up prompt
///
/// Switches the channel to 16-bit mode 0 at 10 MHz, holds nss while the
/// module has data and checks the words it returns.
pub fn run_handshake<S: WordExchange, L: FlowControlLine>(
    spi: &mut BufferedSpiChannel<'_, S, L>,
    timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    spi.format(16, 0)?;
    spi.frequency(HANDSHAKE_FREQUENCY_HZ)?;

    spi.enable_nss()?;
    let words = read_prompt(spi, timeout);
    spi.disable_nss()?;

    let words = words?;
    log::debug!("handshake: read {} words", words.len());

    if !is_prompt(&words) {
        let dump: Vec<String> = words.iter().map(|w| format!("{:04X}", w)).collect();
        return Err(format!("Unexpected module prompt: [{}]", dump.join(" ")).into());
    }

    println!("Module ready (prompt received)");
    Ok(())
}

fn read_prompt<S: WordExchange, L: FlowControlLine>(
    spi: &mut BufferedSpiChannel<'_, S, L>,
    timeout: Duration,
) -> Result<Vec<u16>, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let mut words = Vec::new();

    while words.len() < MAX_PROMPT_WORDS {
        if let Some(word) = spi.get16b() {
            words.push(word);
            continue;
        }
        // data-ready dropped after the prompt
        if !words.is_empty() {
            break;
        }
        if start.elapsed() >= timeout {
            return Err(format!(
                "No prompt from module within {} ms",
                timeout.as_millis()
            )
            .into());
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    Ok(words)
}
