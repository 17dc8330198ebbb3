//! bufspi-dummy - Emulated serial-over-SPI peripheral for testing
//!
//! This crate provides an in-memory model of a WiFi co-processor that talks
//! over SPI with a data-ready line, like the ISM43362 module. It's useful
//! for exercising a [`BufferedSpiChannel`](bufspi_core::BufferedSpiChannel)
//! without real hardware.
//!
//! The model follows the module's handshake:
//!
//! - While unselected, data-ready is high when the module accepts a command
//!   or has a response pending.
//! - Once selected, data-ready stays high only while response bytes remain.
//!   Words the host clocks in are recorded as command bytes, except idle
//!   words clocked while a response is being read.
//! - Deselecting ends the transaction. With `echo` enabled the command is
//!   queued back as the response; a fixed `reply` may be appended.
//! - A 16-bit response with an odd length is padded with the filler byte
//!   (0x15) in the high half of the last word.
//!
//! ```ignore
//! let module = DummyModule::new(DummyConfig::default().with_echo(true));
//! let (bus, lines) = module.split();
//! let mut spi = BufferedSpiChannel::new(bus, lines, ChannelConfig::default())?;
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::collections::VecDeque;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Ref, RefCell, RefMut};

use bufspi_core::bus::{BusFormat, WordExchange, WordWidth};
use bufspi_core::error::{Error, Result};
use bufspi_core::flow::FlowControlLine;

/// Prompt the module sends after reset: filler, "\r\n> "
pub const MODULE_PROMPT: [u8; 6] = [0x15, 0x15, b'\r', b'\n', b'>', b' '];

/// Byte used to pad the last word of an odd-length 16-bit response
pub const FILLER: u8 = 0x15;

/// Word the host clocks out when it only wants to read
const IDLE_WORD: u16 = 0x0000;

/// Configuration for the emulated module
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Queue every received command back as the response
    pub echo: bool,
    /// Response appended after every command
    pub reply: Option<Vec<u8>>,
    /// Start with the power-on prompt pending
    pub prompt: bool,
    /// Accept commands (data-ready high when idle)
    pub accepting: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            echo: false,
            reply: None,
            prompt: false,
            accepting: true,
        }
    }
}

impl DummyConfig {
    /// Echo commands back
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Append a fixed response to every command
    pub fn with_reply(mut self, reply: &[u8]) -> Self {
        self.reply = Some(reply.to_vec());
        self
    }

    /// Start with the power-on prompt pending
    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    /// Accept commands or not
    pub fn with_accepting(mut self, accepting: bool) -> Self {
        self.accepting = accepting;
        self
    }
}

/// Emulated module state
#[derive(Debug)]
pub struct DummyPeer {
    config: DummyConfig,
    selected: bool,
    width: WordWidth,
    frequency_hz: u32,
    /// Response bytes not yet clocked out
    outbox: VecDeque<u8>,
    /// Command bytes of the current transaction
    inbox: Vec<u8>,
    /// Completed commands, oldest first
    transactions: Vec<Vec<u8>>,
    ready_override: Option<bool>,
    fail_after: Option<usize>,
    words: usize,
    idle_words: usize,
    select_count: usize,
}

impl DummyPeer {
    fn new(config: DummyConfig) -> Self {
        let mut outbox = VecDeque::new();
        if config.prompt {
            outbox.extend(MODULE_PROMPT);
        }
        Self {
            config,
            selected: false,
            width: WordWidth::Bits8,
            frequency_hz: 0,
            outbox,
            inbox: Vec::new(),
            transactions: Vec::new(),
            ready_override: None,
            fail_after: None,
            words: 0,
            idle_words: 0,
            select_count: 0,
        }
    }

    /// Current level of the data-ready line
    pub fn data_ready(&self) -> bool {
        if let Some(level) = self.ready_override {
            return level;
        }
        if self.selected {
            !self.outbox.is_empty()
        } else {
            self.config.accepting || !self.outbox.is_empty()
        }
    }

    /// Returns true if nss is asserted
    pub fn is_selected(&self) -> bool {
        self.selected
    }

    /// Completed commands, oldest first
    pub fn transactions(&self) -> &[Vec<u8>] {
        &self.transactions
    }

    /// Remove and return completed commands
    pub fn take_transactions(&mut self) -> Vec<Vec<u8>> {
        core::mem::take(&mut self.transactions)
    }

    /// Bytes of the command currently being clocked in
    pub fn partial_command(&self) -> &[u8] {
        &self.inbox
    }

    /// Queue response bytes
    pub fn queue_response(&mut self, data: &[u8]) {
        self.outbox.extend(data.iter().copied());
    }

    /// Response bytes not yet read by the host
    pub fn pending_response(&self) -> usize {
        self.outbox.len()
    }

    /// Force data-ready to a level, or `None` to follow the model
    pub fn set_ready(&mut self, level: Option<bool>) {
        self.ready_override = level;
    }

    /// Accept commands or not
    pub fn set_accepting(&mut self, accepting: bool) {
        self.config.accepting = accepting;
    }

    /// Fail the word exchange attempted after `words` more successful ones
    pub fn fail_after(&mut self, words: usize) {
        self.fail_after = Some(self.words + words);
    }

    /// Words exchanged so far
    pub fn words_exchanged(&self) -> usize {
        self.words
    }

    /// Idle words clocked in while responding
    pub fn idle_words(&self) -> usize {
        self.idle_words
    }

    /// Number of times nss was asserted
    pub fn select_count(&self) -> usize {
        self.select_count
    }

    /// Word width the bus was last configured with
    pub fn width(&self) -> WordWidth {
        self.width
    }

    /// Clock the bus was last configured with
    pub fn frequency_hz(&self) -> u32 {
        self.frequency_hz
    }

    fn select(&mut self) {
        if !self.selected {
            self.selected = true;
            self.select_count += 1;
        }
    }

    fn deselect(&mut self) {
        if !self.selected {
            return;
        }
        self.selected = false;
        if self.inbox.is_empty() {
            return;
        }

        let command = core::mem::take(&mut self.inbox);
        log::debug!("dummy: command of {} bytes", command.len());
        if self.config.echo {
            self.outbox.extend(command.iter().copied());
        }
        if let Some(reply) = &self.config.reply {
            self.outbox.extend(reply.iter().copied());
        }
        self.transactions.push(command);
    }

    fn exchange(&mut self, out: u16) -> Result<u16> {
        if self.fail_after == Some(self.words) {
            self.fail_after = None;
            log::debug!("dummy: injected transfer failure");
            return Err(Error::TransferFailed);
        }
        if !self.selected {
            log::warn!("dummy: word clocked without nss asserted");
        }
        self.words += 1;

        if out == IDLE_WORD && !self.outbox.is_empty() {
            self.idle_words += 1;
            return Ok(self.next_response_word());
        }

        match self.width {
            WordWidth::Bits8 => self.inbox.push(out as u8),
            WordWidth::Bits16 => self.inbox.extend(out.to_le_bytes()),
        }
        Ok(u16::from_le_bytes([FILLER, FILLER]))
    }

    fn next_response_word(&mut self) -> u16 {
        let lo = self.outbox.pop_front().unwrap_or(FILLER);
        match self.width {
            WordWidth::Bits8 => lo as u16,
            WordWidth::Bits16 => {
                let hi = self.outbox.pop_front().unwrap_or(FILLER);
                u16::from_le_bytes([lo, hi])
            }
        }
    }
}

/// Handle on an emulated module
///
/// Cloning the handle shares the same module.
#[derive(Clone)]
pub struct DummyModule {
    peer: Rc<RefCell<DummyPeer>>,
}

impl DummyModule {
    /// Create a module with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        Self {
            peer: Rc::new(RefCell::new(DummyPeer::new(config))),
        }
    }

    /// Create the bus and line halves a channel is built from
    pub fn split(&self) -> (DummyBus, DummyLines) {
        (
            DummyBus {
                peer: self.peer.clone(),
            },
            DummyLines {
                peer: self.peer.clone(),
            },
        )
    }

    /// Inspect the module
    pub fn peer(&self) -> Ref<'_, DummyPeer> {
        self.peer.borrow()
    }

    /// Modify the module
    pub fn peer_mut(&self) -> RefMut<'_, DummyPeer> {
        self.peer.borrow_mut()
    }
}

/// SPI half of an emulated module
pub struct DummyBus {
    peer: Rc<RefCell<DummyPeer>>,
}

impl WordExchange for DummyBus {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.peer.borrow_mut().frequency_hz = hz;
        Ok(())
    }

    fn set_format(&mut self, format: BusFormat) -> Result<()> {
        self.peer.borrow_mut().width = format.width;
        Ok(())
    }

    fn exchange_word(&mut self, out: u16) -> Result<u16> {
        self.peer.borrow_mut().exchange(out)
    }

    fn delay_us(&mut self, _us: u32) {
        // No delay needed for dummy
    }
}

/// nss and data-ready half of an emulated module
pub struct DummyLines {
    peer: Rc<RefCell<DummyPeer>>,
}

impl FlowControlLine for DummyLines {
    fn assert_select(&mut self) {
        self.peer.borrow_mut().select();
    }

    fn deassert_select(&mut self) {
        self.peer.borrow_mut().deselect();
    }

    fn is_selected(&self) -> bool {
        self.peer.borrow().selected
    }

    fn peer_has_data(&mut self) -> bool {
        self.peer.borrow().data_ready()
    }
}

/// Parse dummy options from a backend string
///
/// Recognised options:
///
/// - `echo=1` - echo commands back
/// - `reply=TEXT` - append TEXT plus "\r\n" to every response
/// - `prompt=1` - start with the power-on prompt pending
/// - `accept=0` - never accept commands
pub fn parse_options(options: &[(&str, &str)]) -> core::result::Result<DummyConfig, String> {
    let mut config = DummyConfig::default();

    for (key, value) in options {
        match *key {
            "echo" => config.echo = parse_flag(key, value)?,
            "prompt" => config.prompt = parse_flag(key, value)?,
            "accept" => config.accepting = parse_flag(key, value)?,
            "reply" => {
                let mut reply = value.as_bytes().to_vec();
                reply.extend_from_slice(b"\r\n");
                config.reply = Some(reply);
            }
            _ => {
                log::warn!("dummy: Unknown option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

fn parse_flag(key: &str, value: &str) -> core::result::Result<bool, String> {
    match value {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(format!("Invalid {} value: {}", key, value)),
    }
}
