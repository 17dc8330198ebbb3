//! Buffered SPI channel
//!
//! [`BufferedSpiChannel`] owns a tx and an rx [`RingBuffer`], the
//! flow-control lines, the word-exchange bus and the interrupt bridge, and
//! runs the transfer state machine:
//!
//! ```text
//!            write/read/pump/on_data_ready
//!   IDLE  ---------------------------------->  DRAINING
//!    ^   <----------------------------------   |
//!    |     tx empty and data-ready low         |
//!    |                                         |
//!    +--------------- close() ----------> CLOSED (terminal)
//! ```
//!
//! A drain cycle asserts nss, clocks out every buffered tx word, then keeps
//! exchanging idle words while the peer raises data-ready, pushing what it
//! receives into the rx buffer. Tx bytes only go out while the peer
//! signals readiness; otherwise they stay buffered for a later cycle.
//!
//! Both rings use the overwrite-oldest policy. [`writeable`] is therefore
//! always true: a producer that outpaces the peer loses its oldest unsent
//! bytes instead of being blocked. Losses are counted in [`ChannelStats`].
//!
//! [`writeable`]: BufferedSpiChannel::writeable

mod config;

#[cfg(test)]
pub(crate) mod mock;

pub use config::*;

use alloc::vec::Vec;
use core::fmt;

use embedded_io::SeekFrom;

use crate::bus::{BusConfig, BusFormat, WordExchange, WordWidth};
use crate::error::{Error, Result};
use crate::flow::FlowControlLine;
use crate::irq::{Callback, InterruptBridge, IrqMask, IrqType};
use crate::ring::RingBuffer;

/// Word clocked out when there is nothing to send
const IDLE_WORD: u16 = 0x0000;

/// State of the transfer state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No transfer in progress
    Idle,
    /// A drain cycle is exchanging words
    Draining,
    /// Channel released; every stream operation fails
    Closed,
}

/// Transfer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Unsent tx bytes overwritten because the tx ring was full
    pub tx_overwritten: u32,
    /// Unread rx bytes overwritten because the rx ring was full
    pub rx_overwritten: u32,
    /// Words exchanged on the bus
    pub words_exchanged: u32,
    /// Drain cycles run
    pub cycles: u32,
    /// Drain cycles aborted by a failed word exchange
    pub failed_cycles: u32,
    /// Tx payload bytes clocked out
    pub tx_bytes: u32,
    /// Bytes delivered to the rx ring
    pub rx_bytes: u32,
}

/// Buffered, interrupt-driven serial-over-SPI channel
///
/// `'a` is the lifetime of attached interrupt handlers.
pub struct BufferedSpiChannel<'a, B, L> {
    bus: B,
    lines: L,
    config: ChannelConfig,
    tx: RingBuffer<u8>,
    rx: RingBuffer<u8>,
    irq: InterruptBridge<'a>,
    state: ChannelState,
    /// nss is held by enable_nss() rather than by a drain cycle
    manual_nss: bool,
    /// Settings currently programmed into the bus
    active_bus: BusConfig,
    /// Settings requested while draining, applied on return to IDLE
    pending_bus: Option<BusConfig>,
    stats: ChannelStats,
}

impl<'a, B: WordExchange, L: FlowControlLine> BufferedSpiChannel<'a, B, L> {
    /// Create a channel and program the bus
    ///
    /// Fails fast on an invalid configuration or if the bus rejects the
    /// initial frequency/format. nss is left deasserted and the rx
    /// interrupt source is armed.
    pub fn new(mut bus: B, mut lines: L, config: ChannelConfig) -> Result<Self> {
        config.validate()?;

        let active_bus = config.bus();
        bus.set_frequency(active_bus.frequency_hz)?;
        bus.set_format(active_bus.format)?;
        lines.deassert_select();

        let mut irq = InterruptBridge::new();
        irq.arm(IrqMask::RX);

        log::debug!(
            "{}: opened (rx {} bytes, tx {} bytes, {} bits, mode {}, {} Hz)",
            config.name.unwrap_or("bufspi"),
            config.buf_size,
            config.tx_capacity(),
            active_bus.format.width.bits(),
            active_bus.format.mode.number(),
            active_bus.frequency_hz
        );

        Ok(Self {
            bus,
            lines,
            tx: RingBuffer::new(config.tx_capacity()),
            rx: RingBuffer::new(config.buf_size),
            config,
            irq,
            state: ChannelState::Idle,
            manual_nss: false,
            active_bus,
            pending_bus: None,
            stats: ChannelStats::default(),
        })
    }

    fn label(&self) -> &'static str {
        self.config.name.unwrap_or("bufspi")
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ChannelState::Closed {
            Err(Error::BadDescriptor)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Stream operations
    // ------------------------------------------------------------------

    /// Queue `data` for transmission and try to send it
    ///
    /// Returns the number of bytes accepted into the tx ring, which is
    /// always `data.len()`. If the ring overflows, the oldest unsent bytes
    /// are dropped. Once accepted, bytes are never reported as failed: if
    /// the drain cycle fails on the bus, the unsent bytes stay buffered for
    /// the next cycle and the failure shows in
    /// [`ChannelStats::failed_cycles`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open()?;
        if data.is_empty() {
            return Ok(0);
        }

        self.enqueue_tx(data);
        self.start_tx();
        Ok(data.len())
    }

    /// Read up to `buf.len()` bytes
    ///
    /// Returns immediately when the rx ring holds data. Otherwise runs a
    /// transfer attempt; if nothing arrives, a non-blocking channel fails
    /// with [`Error::WouldBlock`] and a blocking channel keeps polling
    /// every `poll_interval_us` with no timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.try_read(buf) {
                Err(Error::WouldBlock) if self.config.blocking => {
                    let us = self.config.poll_interval_us;
                    self.bus.delay_us(us);
                }
                other => return other,
            }
        }
    }

    /// Single-attempt read that never blocks, whatever the channel mode
    pub fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() {
            return Ok(0);
        }

        if self.rx.is_empty() {
            self.attempt_transfer()?;
        }
        if self.rx.is_empty() {
            return Err(Error::WouldBlock);
        }

        let mut n = 0;
        while n < buf.len() {
            match self.rx.pop() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    /// Release the channel
    ///
    /// Disarms both interrupt sources before dropping buffered data, then
    /// deasserts nss. Closing twice is not an error.
    pub fn close(&mut self) -> Result<()> {
        if self.state == ChannelState::Closed {
            return Ok(());
        }

        self.irq.disarm(IrqMask::all());
        if self.lines.is_selected() {
            self.lines.deassert_select();
        }
        self.manual_nss = false;

        if !self.tx.is_empty() {
            log::debug!(
                "{}: close discards {} unsent bytes",
                self.label(),
                self.tx.available()
            );
        }
        self.tx.clear();
        self.rx.clear();
        self.state = ChannelState::Closed;
        log::debug!("{}: closed", self.label());
        Ok(())
    }

    /// Always fails: the channel is a stream device
    pub fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(Error::NotSeekable)
    }

    /// Returns true if the rx ring holds at least one byte
    ///
    /// Does not start a transfer.
    pub fn readable(&self) -> bool {
        !self.rx.is_empty()
    }

    /// Always true
    ///
    /// The tx ring overwrites its oldest content when full, so a write never
    /// waits for room. Callers producing faster than the peer drains lose
    /// data; see [`ChannelStats::tx_overwritten`].
    pub fn writeable(&self) -> bool {
        true
    }

    /// Send everything still buffered in the tx ring
    ///
    /// A non-blocking channel fails with [`Error::WouldBlock`] if the peer
    /// is not ready; a blocking one polls until the ring is empty.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        while !self.tx.is_empty() {
            self.pump()?;
            if self.tx.is_empty() {
                break;
            }
            if !self.config.blocking || self.manual_nss {
                return Err(Error::WouldBlock);
            }
            let us = self.config.poll_interval_us;
            self.bus.delay_us(us);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Convenience I/O
    // ------------------------------------------------------------------

    /// Read one byte, or `None` if nothing is available
    ///
    /// Never blocks. Check [`readable`](Self::readable) first to avoid the
    /// transfer attempt made on an empty rx ring.
    pub fn getc(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.try_read(&mut byte) {
            Ok(1) => Some(byte[0]),
            _ => None,
        }
    }

    /// Read two bytes as a little-endian 16-bit value
    ///
    /// Returns `None`, consuming nothing, if fewer than two bytes are
    /// available after one transfer attempt per missing word.
    pub fn get16b(&mut self) -> Option<u16> {
        if self.ensure_open().is_err() {
            return None;
        }

        let words = match self.active_bus.format.width {
            WordWidth::Bits8 => 2,
            WordWidth::Bits16 => 1,
        };
        for _ in 0..words {
            if self.rx.available() >= 2 {
                break;
            }
            match self.attempt_transfer() {
                Ok(n) if n > 0 => {}
                _ => break,
            }
        }

        if self.rx.available() < 2 {
            return None;
        }
        let lo = self.rx.pop()?;
        let hi = self.rx.pop()?;
        Some(u16::from_le_bytes([lo, hi]))
    }

    /// Write one byte
    pub fn putc(&mut self, c: u8) -> Result<u8> {
        self.write(&[c])?;
        Ok(c)
    }

    /// Write a string followed by a newline
    ///
    /// Returns the number of bytes queued, newline included.
    pub fn puts(&mut self, s: &str) -> Result<usize> {
        self.ensure_open()?;
        self.enqueue_tx(s.as_bytes());
        self.enqueue_tx(b"\n");
        self.start_tx();
        Ok(s.len() + 1)
    }

    /// Render formatted output and write it
    ///
    /// Output longer than `buf_size` is truncated. The tx ring never holds
    /// more than `tx_multiple` rendered buffers: when the new output does
    /// not fit in the free space, a blocking channel polls until earlier
    /// output drains and a non-blocking one fails with
    /// [`Error::WouldBlock`] without queueing anything.
    ///
    /// ```ignore
    /// spi.printf(format_args!("C1={}\r", ssid))?;
    /// ```
    pub fn printf(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        self.ensure_open()?;

        let mut out = BoundedWriter::new(self.config.buf_size);
        // BoundedWriter truncates instead of failing
        let _ = fmt::write(&mut out, args);
        if out.truncated {
            log::debug!(
                "{}: printf output truncated to {} bytes",
                self.label(),
                self.config.buf_size
            );
        }

        self.reserve_tx(out.buf.len())?;
        self.write(&out.buf)
    }

    /// Run one transfer attempt and return the number of bytes it delivered
    /// to the rx ring
    pub fn fill(&mut self) -> Result<usize> {
        self.ensure_open()?;
        self.attempt_transfer()
    }

    /// Drop every unsent byte without transmitting it
    pub fn flush_txbuf(&mut self) {
        self.tx.clear();
        self.irq.disarm(IrqMask::TX);
    }

    // ------------------------------------------------------------------
    // Interrupts
    // ------------------------------------------------------------------

    /// Attach or replace the handler for `slot`
    ///
    /// `None` detaches the current handler.
    pub fn attach(&mut self, handler: Option<Callback<'a>>, slot: IrqType) {
        self.irq.register(slot, handler);
    }

    /// Interrupt entry point for the data-ready line
    ///
    /// Runs a drain cycle if the rx source is armed. Bus errors are logged
    /// since there is no caller to report them to.
    pub fn on_data_ready(&mut self) {
        if self.state == ChannelState::Closed || !self.irq.is_armed(IrqType::Rx) {
            return;
        }
        if let Err(e) = self.pump() {
            log::warn!("{}: drain from interrupt failed: {}", self.label(), e);
        }
    }

    /// Interrupt bridge state (handlers and armed sources)
    pub fn interrupts(&self) -> &InterruptBridge<'a> {
        &self.irq
    }

    // ------------------------------------------------------------------
    // Bus configuration
    // ------------------------------------------------------------------

    /// Set the bus clock
    ///
    /// Requested while draining, the change is deferred until the cycle
    /// returns to IDLE.
    pub fn frequency(&mut self, hz: u32) -> Result<()> {
        self.ensure_open()?;
        if hz == 0 {
            return Err(Error::InvalidFrequency);
        }
        let mut next = self.pending_bus.unwrap_or(self.active_bus);
        next.frequency_hz = hz;
        self.request_bus(next)
    }

    /// Set word width (8 or 16 bits) and SPI mode (0-3)
    ///
    /// Invalid values fail immediately with [`Error::InvalidFormat`].
    /// Requested while draining, the change is deferred until the cycle
    /// returns to IDLE.
    pub fn format(&mut self, bits: u8, mode: u8) -> Result<()> {
        self.ensure_open()?;
        let format = BusFormat::new(bits, mode)?;
        let mut next = self.pending_bus.unwrap_or(self.active_bus);
        next.format = format;
        self.request_bus(next)
    }

    /// Bus settings currently in effect
    pub fn bus_config(&self) -> BusConfig {
        self.active_bus
    }

    /// Apply `next` now, or at the end of the running drain cycle
    ///
    /// Every public method takes `&mut self` and handlers cannot reach the
    /// channel, so outside code never sees DRAINING here. The deferral keeps
    /// a mid-cycle change from reaching the bus if that ever stops holding.
    fn request_bus(&mut self, next: BusConfig) -> Result<()> {
        self.pending_bus = Some(next);
        if self.state == ChannelState::Draining {
            log::debug!("{}: bus change deferred until idle", self.label());
            return Ok(());
        }
        self.apply_pending_bus()
    }

    fn apply_pending_bus(&mut self) -> Result<()> {
        let Some(next) = self.pending_bus.take() else {
            return Ok(());
        };

        if next.frequency_hz != self.active_bus.frequency_hz {
            self.bus.set_frequency(next.frequency_hz)?;
            self.active_bus.frequency_hz = next.frequency_hz;
        }
        if next.format != self.active_bus.format {
            self.bus.set_format(next.format)?;
            self.active_bus.format = next.format;
        }

        log::debug!(
            "{}: bus set to {} Hz, {} bits, mode {}",
            self.label(),
            self.active_bus.frequency_hz,
            self.active_bus.format.width.bits(),
            self.active_bus.format.mode.number()
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Manual chip select
    // ------------------------------------------------------------------

    /// Assert nss and hold it until [`disable_nss`](Self::disable_nss)
    ///
    /// While nss is held manually, drain cycles do not run; reads clock
    /// single words instead. Used for sequences such as a module's
    /// start-up prompt read.
    pub fn enable_nss(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.lines.assert_select();
        self.manual_nss = true;
        let us = self.config.nss_settle_us;
        self.bus.delay_us(us);
        Ok(())
    }

    /// Release a manually held nss
    pub fn disable_nss(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.lines.deassert_select();
        self.manual_nss = false;
        let us = self.config.nss_settle_us;
        self.bus.delay_us(us);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transfer state machine
    // ------------------------------------------------------------------

    /// Run one drain cycle
    ///
    /// This is the polling entry point for applications without a
    /// data-ready interrupt. Returns the number of bytes delivered to the
    /// rx ring. Does nothing while nss is held manually. While data-ready
    /// is low, nss is left alone and tx data stays buffered.
    ///
    /// A failed word exchange aborts the cycle: nss is released, the word
    /// that failed stays in the tx ring (or is not counted as received),
    /// and the error is returned.
    pub fn pump(&mut self) -> Result<usize> {
        self.ensure_open()?;
        if self.manual_nss || self.state != ChannelState::Idle {
            return Ok(0);
        }
        // nss is only asserted once the peer raises data-ready
        if !self.lines.peer_has_data() {
            if !self.tx.is_empty() {
                log::trace!(
                    "{}: peer not ready, {} tx bytes stay buffered",
                    self.label(),
                    self.tx.available()
                );
            }
            self.apply_pending_bus()?;
            return Ok(0);
        }

        let had_tx = !self.tx.is_empty();
        let mut received = 0;

        self.state = ChannelState::Draining;
        self.lines.assert_select();
        let result = self.drain(&mut received);
        self.lines.deassert_select();
        self.state = ChannelState::Idle;
        self.stats.cycles = self.stats.cycles.wrapping_add(1);

        if had_tx && self.tx.is_empty() && self.irq.is_armed(IrqType::Tx) {
            self.irq.disarm(IrqMask::TX);
            self.irq.notify(IrqType::Tx);
        }
        if received > 0 && self.irq.is_armed(IrqType::Rx) {
            self.irq.notify(IrqType::Rx);
        }

        let applied = self.apply_pending_bus();
        if let Err(e) = result {
            self.stats.failed_cycles = self.stats.failed_cycles.wrapping_add(1);
            log::warn!("{}: drain cycle aborted: {}", self.label(), e);
            return Err(e);
        }
        applied?;

        log::trace!(
            "{}: drain cycle done ({} rx bytes, {} tx bytes left)",
            self.label(),
            received,
            self.tx.available()
        );
        Ok(received)
    }

    /// Drain cycle for bytes that were just accepted
    ///
    /// The writer already owns a success count, so errors stay here.
    /// `pump` counts and logs a failed cycle.
    fn start_tx(&mut self) {
        if let Err(e) = self.pump() {
            log::debug!(
                "{}: {} tx bytes kept for the next cycle ({})",
                self.label(),
                self.tx.available(),
                e
            );
        }
    }

    fn drain(&mut self, received: &mut usize) -> Result<()> {
        // Tx phase: the peer is listening, whatever it clocks back is not data
        while let Some((word, len)) = self.next_tx_word() {
            self.exchange(word)?;
            for _ in 0..len {
                self.tx.pop();
            }
            self.stats.tx_bytes = self.stats.tx_bytes.wrapping_add(len as u32);
        }

        // Rx phase
        let mut more = self.lines.peer_has_data();
        while more {
            let word = self.exchange(IDLE_WORD)?;
            more = self.lines.peer_has_data();
            *received += self.store_rx_word(word, !more);
        }
        Ok(())
    }

    /// One transfer attempt: a drain cycle, or a single word under manual nss
    fn attempt_transfer(&mut self) -> Result<usize> {
        if !self.manual_nss {
            return self.pump();
        }
        if !self.lines.peer_has_data() {
            return Ok(0);
        }

        let word = self.exchange(IDLE_WORD)?;
        // Manual sequences want the raw word, filler included
        let n = self.store_rx_word(word, false);
        if self.irq.is_armed(IrqType::Rx) {
            self.irq.notify(IrqType::Rx);
        }
        Ok(n)
    }

    fn exchange(&mut self, out: u16) -> Result<u16> {
        let word = self.bus.exchange_word(out)?;
        self.stats.words_exchanged = self.stats.words_exchanged.wrapping_add(1);
        Ok(word)
    }

    /// Next tx word and the number of payload bytes it carries
    fn next_tx_word(&self) -> Option<(u16, usize)> {
        let lo = self.tx.peek()?;
        match self.active_bus.format.width {
            WordWidth::Bits8 => Some((lo as u16, 1)),
            WordWidth::Bits16 => match self.tx.get(1) {
                Some(hi) => Some((u16::from_le_bytes([lo, hi]), 2)),
                None => Some((u16::from_le_bytes([lo, self.config.pad_byte]), 1)),
            },
        }
    }

    /// Push a received word into the rx ring, low byte first
    fn store_rx_word(&mut self, word: u16, last: bool) -> usize {
        let [lo, hi] = word.to_le_bytes();
        self.push_rx(lo);

        if self.active_bus.format.width == WordWidth::Bits8 {
            return 1;
        }
        if last && self.config.trailing_filler == Some(hi) {
            return 1;
        }
        self.push_rx(hi);
        2
    }

    fn push_rx(&mut self, byte: u8) {
        if !self.rx.push(byte) {
            self.stats.rx_overwritten = self.stats.rx_overwritten.wrapping_add(1);
        }
        self.stats.rx_bytes = self.stats.rx_bytes.wrapping_add(1);
    }

    fn enqueue_tx(&mut self, data: &[u8]) {
        let mut dropped = 0u32;
        for &byte in data {
            if !self.tx.push(byte) {
                dropped += 1;
            }
        }
        if !self.tx.is_empty() {
            self.irq.arm(IrqMask::TX);
        }
        if dropped > 0 {
            self.stats.tx_overwritten = self.stats.tx_overwritten.wrapping_add(dropped);
            log::warn!(
                "{}: tx buffer full, dropped {} oldest bytes",
                self.label(),
                dropped
            );
        }
    }

    /// Wait until `len` bytes fit in the tx ring without overwriting
    fn reserve_tx(&mut self, len: usize) -> Result<()> {
        loop {
            if self.tx.free() >= len {
                return Ok(());
            }
            self.pump()?;
            if self.tx.free() >= len {
                return Ok(());
            }
            if !self.config.blocking || self.manual_nss {
                return Err(Error::WouldBlock);
            }
            let us = self.config.poll_interval_us;
            self.bus.delay_us(us);
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Transfer counters
    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Channel configuration
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Channel name
    pub fn name(&self) -> Option<&'static str> {
        self.config.name
    }

    /// Select blocking or non-blocking mode
    pub fn set_blocking(&mut self, blocking: bool) {
        self.config.blocking = blocking;
    }

    /// Returns true if reads and printf block
    pub fn is_blocking(&self) -> bool {
        self.config.blocking
    }

    /// Bytes waiting in the rx ring
    pub fn rx_available(&self) -> usize {
        self.rx.available()
    }

    /// Bytes waiting in the tx ring
    pub fn tx_pending(&self) -> usize {
        self.tx.available()
    }

    /// Unsent tx bytes, oldest first
    pub fn tx_contents(&self) -> impl Iterator<Item = u8> + '_ {
        self.tx.iter()
    }

    /// Returns true if nss is held by [`enable_nss`](Self::enable_nss)
    pub fn nss_held(&self) -> bool {
        self.manual_nss
    }

    /// The word-exchange bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// The flow-control lines
    pub fn lines(&self) -> &L {
        &self.lines
    }

    /// Close the channel and give back the bus and lines
    pub fn into_parts(mut self) -> (B, L) {
        let _ = self.close();
        (self.bus, self.lines)
    }
}

/// `fmt::Write` sink that keeps at most `limit` bytes
struct BoundedWriter {
    buf: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl BoundedWriter {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::with_capacity(limit),
            limit,
            truncated: false,
        }
    }
}

impl fmt::Write for BoundedWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.limit - self.buf.len();
        let bytes = s.as_bytes();
        if bytes.len() > room {
            self.truncated = true;
        }
        self.buf.extend_from_slice(&bytes[..bytes.len().min(room)]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{mock, MockBus, MockLines, Peer};
    use super::*;
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;
    use core::sync::atomic::{AtomicU32, Ordering};

    type TestChannel<'a> = BufferedSpiChannel<'a, MockBus, MockLines>;

    fn channel<'a>(config: ChannelConfig, accepting: bool) -> (TestChannel<'a>, Rc<RefCell<Peer>>) {
        let (bus, lines, peer) = mock(accepting);
        let spi = BufferedSpiChannel::new(bus, lines, config.with_nss_settle_us(0)).unwrap();
        (spi, peer)
    }

    fn words(bytes: &[u8]) -> Vec<u16> {
        bytes.iter().map(|&b| b as u16).collect()
    }

    #[test]
    fn test_new_programs_bus() {
        let config = ChannelConfig::default().with_format(16, 3).with_frequency(10_000_000);
        let (spi, peer) = channel(config, false);
        let peer = peer.borrow();
        assert_eq!(peer.frequency, 10_000_000);
        assert_eq!(peer.format, Some(BusFormat::new(16, 3).unwrap()));
        assert!(!peer.selected);
        assert_eq!(spi.state(), ChannelState::Idle);
        assert!(spi.interrupts().is_armed(IrqType::Rx));
    }

    #[test]
    fn test_new_rejects_bad_config() {
        let (bus, lines, _peer) = mock(false);
        let config = ChannelConfig::default().with_buffers(0, 1);
        assert!(matches!(
            BufferedSpiChannel::new(bus, lines, config),
            Err(Error::InvalidConfig)
        ));
    }

    #[test]
    fn test_loopback_round_trip() {
        let (mut spi, peer) = channel(ChannelConfig::default(), true);
        assert_eq!(spi.write(b"hello"), Ok(5));
        assert_eq!(spi.tx_pending(), 0);
        assert_eq!(peer.borrow().sent, words(b"hello"));

        // Peer echoes back what it received
        let echo = peer.borrow().sent.clone();
        peer.borrow_mut().replies.extend(echo);

        let mut buf = [0u8; 16];
        assert_eq!(spi.read(&mut buf), Ok(5));
        assert_eq!(&buf[..5], b"hello");
        assert!(!spi.readable());
        assert!(!peer.borrow().selected);
    }

    #[test]
    fn test_tx_overwrites_oldest_when_peer_not_ready() {
        let config = ChannelConfig::default().with_buffers(8, 1);
        let (mut spi, peer) = channel(config, false);

        let data: Vec<u8> = (0..10).collect();
        assert_eq!(spi.write(&data), Ok(10));

        let pending: Vec<u8> = spi.tx_contents().collect();
        assert_eq!(pending, (2..10).collect::<Vec<u8>>());
        assert_eq!(spi.stats().tx_overwritten, 2);
        assert!(spi.writeable());
        assert!(peer.borrow().sent.is_empty());
    }

    #[test]
    fn test_nonblocking_read_would_block() {
        let config = ChannelConfig::default().with_blocking(false);
        let (mut spi, peer) = channel(config, false);
        let mut buf = [0u8; 4];
        assert_eq!(spi.read(&mut buf), Err(Error::WouldBlock));
        assert_eq!(peer.borrow().exchanges, 0);
        assert!(!peer.borrow().selected);
    }

    #[test]
    fn test_blocking_read_polls_until_data() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        peer.borrow_mut().late_replies = Some((3, words(b"ok")));

        let mut buf = [0u8; 8];
        assert_eq!(spi.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ok");
        assert_eq!(peer.borrow().delays, 3);
    }

    #[test]
    fn test_peer_words_fill_rx() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        peer.borrow_mut().replies.extend(words(b"ABC"));

        assert!(!spi.readable());
        assert_eq!(spi.pump(), Ok(3));
        assert_eq!(spi.rx_available(), 3);
        assert!(spi.readable());

        let mut buf = [0u8; 3];
        assert_eq!(spi.read(&mut buf), Ok(3));
        assert_eq!(&buf, b"ABC");
        assert_eq!(spi.rx_available(), 0);
        assert!(!spi.readable());

        // Every rx word was clocked out as an idle word
        assert_eq!(peer.borrow().sent, vec![0u16; 3]);
    }

    #[test]
    fn test_rx_overwrites_oldest() {
        let config = ChannelConfig::default().with_buffers(4, 1);
        let (mut spi, peer) = channel(config, false);
        peer.borrow_mut().replies.extend([0u16, 1, 2, 3, 4, 5]);

        assert_eq!(spi.pump(), Ok(6));
        assert_eq!(spi.rx_available(), 4);
        assert_eq!(spi.stats().rx_overwritten, 2);

        let mut buf = [0u8; 8];
        assert_eq!(spi.read(&mut buf), Ok(4));
        assert_eq!(&buf[..4], &[2, 3, 4, 5]);
    }

    #[test]
    fn test_rx_irq_once_per_cycle() {
        let hits = AtomicU32::new(0);
        let on_rx = || {
            hits.fetch_add(1, Ordering::Relaxed);
        };

        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        spi.attach(Some(&on_rx), IrqType::Rx);

        peer.borrow_mut().replies.extend(words(b"xyz"));
        spi.on_data_ready();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(spi.rx_available(), 3);

        // Nothing new, no notification
        spi.on_data_ready();
        assert_eq!(hits.load(Ordering::Relaxed), 1);

        spi.attach(None, IrqType::Rx);
        peer.borrow_mut().replies.push_back(1);
        spi.on_data_ready();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert_eq!(spi.rx_available(), 4);
    }

    #[test]
    fn test_tx_irq_on_drain() {
        let hits = AtomicU32::new(0);
        let on_tx = || {
            hits.fetch_add(1, Ordering::Relaxed);
        };

        let (mut spi, peer) = channel(ChannelConfig::default(), true);
        spi.attach(Some(&on_tx), IrqType::Tx);

        spi.write(b"abc").unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        assert!(!spi.interrupts().is_armed(IrqType::Tx));

        spi.write(b"d").unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 2);

        // Discarded data is not a completed transmission
        peer.borrow_mut().accepting = false;
        spi.write(b"lost").unwrap();
        assert_eq!(spi.tx_pending(), 4);
        spi.flush_txbuf();
        assert_eq!(spi.tx_pending(), 0);
        peer.borrow_mut().accepting = true;
        spi.pump().unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_16bit_packing_pads_odd_tail() {
        let config = ChannelConfig::default().with_format(16, 0);
        let (mut spi, peer) = channel(config, true);

        spi.write(b"ABC").unwrap();
        assert_eq!(peer.borrow().sent, vec![0x4241, 0x0A43]);
        assert_eq!(spi.stats().tx_bytes, 3);
        assert_eq!(spi.stats().words_exchanged, 2);
    }

    #[test]
    fn test_16bit_trailing_filler_dropped() {
        let config = ChannelConfig::default().with_format(16, 0);
        let (mut spi, peer) = channel(config, false);

        peer.borrow_mut().replies.extend([0x4241, 0x1543]);
        assert_eq!(spi.pump(), Ok(3));
        let mut buf = [0u8; 8];
        assert_eq!(spi.read(&mut buf), Ok(3));
        assert_eq!(&buf[..3], b"ABC");

        // Only the last word of a reception is checked
        peer.borrow_mut().replies.extend([0x1541, 0x4342]);
        assert_eq!(spi.pump(), Ok(4));
        assert_eq!(spi.read(&mut buf), Ok(4));
        assert_eq!(&buf[..4], b"A\x15BC");
    }

    #[test]
    fn test_16bit_filler_kept_when_disabled() {
        let config = ChannelConfig::default()
            .with_format(16, 0)
            .with_trailing_filler(None);
        let (mut spi, peer) = channel(config, false);

        peer.borrow_mut().replies.push_back(0x1543);
        assert_eq!(spi.pump(), Ok(2));
        assert_eq!(spi.getc(), Some(0x43));
        assert_eq!(spi.getc(), Some(0x15));
    }

    #[test]
    fn test_tx_failure_keeps_unsent_bytes() {
        let (mut spi, peer) = channel(ChannelConfig::default(), true);
        peer.borrow_mut().fail_at = Some(1);

        assert_eq!(spi.write(b"ABCD"), Ok(4));
        let pending: Vec<u8> = spi.tx_contents().collect();
        assert_eq!(pending, b"BCD");
        assert_eq!(spi.state(), ChannelState::Idle);
        assert!(!peer.borrow().selected);
        assert_eq!(spi.stats().failed_cycles, 1);

        assert_eq!(spi.pump(), Ok(0));
        assert_eq!(spi.tx_pending(), 0);
        assert_eq!(peer.borrow().sent, words(b"ABCD"));
    }

    #[test]
    fn test_write_after_failed_cycle_sends_each_byte_once() {
        let (mut spi, peer) = channel(ChannelConfig::default(), true);
        peer.borrow_mut().fail_at = Some(1);

        // A caller retrying only on error must not see one here
        assert_eq!(spi.write(b"ABCD"), Ok(4));
        assert_eq!(spi.write(b"EF"), Ok(2));
        assert_eq!(spi.tx_pending(), 0);
        assert_eq!(peer.borrow().sent, words(b"ABCDEF"));
        assert_eq!(spi.stats().failed_cycles, 1);
    }

    #[test]
    fn test_puts_after_failed_cycle_keeps_line() {
        let (mut spi, peer) = channel(ChannelConfig::default(), true);
        peer.borrow_mut().fail_at = Some(0);

        assert_eq!(spi.puts("AT"), Ok(3));
        assert_eq!(spi.tx_pending(), 3);
        assert!(peer.borrow().sent.is_empty());

        spi.flush().unwrap();
        assert_eq!(peer.borrow().sent, words(b"AT\n"));
    }

    #[test]
    fn test_rx_failure_loses_nothing() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        peer.borrow_mut().replies.extend(words(b"123"));
        peer.borrow_mut().fail_at = Some(1);

        assert_eq!(spi.pump(), Err(Error::TransferFailed));
        assert_eq!(spi.rx_available(), 1);
        assert!(!peer.borrow().selected);

        assert_eq!(spi.pump(), Ok(2));
        let mut buf = [0u8; 4];
        assert_eq!(spi.read(&mut buf), Ok(3));
        assert_eq!(&buf[..3], b"123");
    }

    #[test]
    fn test_bus_config_changes() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);

        assert_eq!(spi.format(12, 0), Err(Error::InvalidFormat));
        assert_eq!(spi.format(8, 4), Err(Error::InvalidFormat));
        assert_eq!(spi.frequency(0), Err(Error::InvalidFrequency));

        spi.format(16, 1).unwrap();
        spi.frequency(10_000_000).unwrap();
        assert_eq!(peer.borrow().format, Some(BusFormat::new(16, 1).unwrap()));
        assert_eq!(peer.borrow().frequency, 10_000_000);
        assert_eq!(spi.bus_config().format.width, WordWidth::Bits16);
    }

    #[test]
    fn test_bus_change_deferred_while_draining() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);

        // Only reachable from inside the module, so set the state directly

        spi.state = ChannelState::Draining;
        spi.frequency(2_000_000).unwrap();
        spi.format(16, 0).unwrap();
        assert_eq!(peer.borrow().frequency, DEFAULT_FREQUENCY_HZ);
        assert_eq!(spi.bus_config().format.width, WordWidth::Bits8);

        spi.state = ChannelState::Idle;
        spi.pump().unwrap();
        assert_eq!(peer.borrow().frequency, 2_000_000);
        assert_eq!(spi.bus_config().format.width, WordWidth::Bits16);
    }

    #[test]
    fn test_printf_caps_pending_output() {
        let config = ChannelConfig::default()
            .with_buffers(8, 2)
            .with_blocking(false);
        let (mut spi, peer) = channel(config, false);

        assert_eq!(spi.printf(format_args!("{}", "abcdefgh")), Ok(8));
        assert_eq!(spi.printf(format_args!("{}", "ijklmnop")), Ok(8));
        assert_eq!(spi.printf(format_args!("{}", "q")), Err(Error::WouldBlock));
        assert_eq!(spi.tx_pending(), 16);
        assert_eq!(spi.stats().tx_overwritten, 0);

        // Once the peer drains earlier output there is room again
        peer.borrow_mut().accepting = true;
        assert_eq!(spi.printf(format_args!("{}", "q")), Ok(1));
        assert_eq!(spi.tx_pending(), 0);
        assert_eq!(peer.borrow().sent.len(), 17);
    }

    #[test]
    fn test_printf_truncates_to_buf_size() {
        let config = ChannelConfig::default().with_buffers(8, 4);
        let (mut spi, peer) = channel(config, true);

        assert_eq!(spi.printf(format_args!("{}-{}", 1234, 56789)), Ok(8));
        assert_eq!(peer.borrow().sent, words(b"1234-567"));
    }

    #[test]
    fn test_puts_and_putc() {
        let (mut spi, peer) = channel(ChannelConfig::default(), true);
        assert_eq!(spi.puts("AT"), Ok(3));
        assert_eq!(spi.putc(b'x'), Ok(b'x'));
        assert_eq!(peer.borrow().sent, words(b"AT\nx"));
    }

    #[test]
    fn test_getc() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        assert_eq!(spi.getc(), None);
        peer.borrow_mut().replies.push_back(b'Z' as u16);
        assert_eq!(spi.getc(), Some(b'Z'));
        assert_eq!(spi.getc(), None);
    }

    #[test]
    fn test_manual_nss_prompt_read() {
        let config = ChannelConfig::default().with_format(16, 0);
        let (mut spi, peer) = channel(config, false);

        spi.enable_nss().unwrap();
        assert!(spi.nss_held());
        assert!(peer.borrow().selected);

        peer.borrow_mut().replies.extend([0x1515, 0x0A0D]);
        // Drain cycles stay out of the way while nss is held
        assert_eq!(spi.pump(), Ok(0));
        assert_eq!(peer.borrow().replies.len(), 2);

        assert_eq!(spi.get16b(), Some(0x1515));
        assert_eq!(spi.get16b(), Some(0x0A0D));
        assert_eq!(spi.get16b(), None);

        spi.disable_nss().unwrap();
        assert!(!spi.nss_held());
        assert!(!peer.borrow().selected);
        assert_eq!(peer.borrow().delays, 2);
    }

    #[test]
    fn test_get16b_8bit_needs_two_words() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        peer.borrow_mut().replies.push_back(0x34);
        assert_eq!(spi.pump(), Ok(1));
        assert_eq!(spi.get16b(), None);
        assert_eq!(spi.rx_available(), 1);

        peer.borrow_mut().replies.push_back(0x12);
        assert_eq!(spi.get16b(), Some(0x1234));
    }

    #[test]
    fn test_flush() {
        let config = ChannelConfig::default().with_blocking(false);
        let (mut spi, peer) = channel(config, false);

        spi.write(b"ab").unwrap();
        assert_eq!(spi.flush(), Err(Error::WouldBlock));
        assert_eq!(spi.tx_pending(), 2);

        peer.borrow_mut().accepting = true;
        assert_eq!(spi.flush(), Ok(()));
        assert_eq!(spi.tx_pending(), 0);
    }

    #[test]
    fn test_close() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        spi.write(b"pending").unwrap();
        peer.borrow_mut().replies.push_back(1);
        spi.enable_nss().unwrap();

        assert_eq!(spi.close(), Ok(()));
        assert_eq!(spi.close(), Ok(()));
        assert_eq!(spi.state(), ChannelState::Closed);
        assert!(!peer.borrow().selected);
        assert!(spi.interrupts().armed().is_empty());
        assert_eq!(spi.tx_pending(), 0);

        let mut buf = [0u8; 4];
        assert_eq!(spi.read(&mut buf), Err(Error::BadDescriptor));
        assert_eq!(spi.write(b"x"), Err(Error::BadDescriptor));
        assert_eq!(spi.puts("x"), Err(Error::BadDescriptor));
        assert_eq!(spi.pump(), Err(Error::BadDescriptor));
        assert_eq!(spi.frequency(1_000), Err(Error::BadDescriptor));
        assert_eq!(spi.getc(), None);
        assert_eq!(spi.get16b(), None);
    }

    #[test]
    fn test_seek_always_fails() {
        let (mut spi, _peer) = channel(ChannelConfig::default(), false);
        for pos in [SeekFrom::Start(0), SeekFrom::End(-1), SeekFrom::Current(5)] {
            assert_eq!(spi.seek(pos), Err(Error::NotSeekable));
        }
        spi.close().unwrap();
        assert_eq!(spi.seek(SeekFrom::Start(0)), Err(Error::NotSeekable));
    }

    #[test]
    fn test_into_parts_closes() {
        let (mut spi, peer) = channel(ChannelConfig::default(), false);
        spi.enable_nss().unwrap();
        let (_bus, lines) = spi.into_parts();
        assert!(!lines.is_selected());
        assert!(!peer.borrow().selected);
    }
}
