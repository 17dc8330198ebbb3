//! Scripted peer used by the channel tests

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::bus::{BusFormat, WordExchange};
use crate::error::{Error, Result};
use crate::flow::FlowControlLine;

/// State shared by the bus and line halves
#[derive(Debug, Default)]
pub struct Peer {
    /// Words clocked back to the channel, in order
    pub replies: VecDeque<u16>,
    /// Peer raises data-ready to accept a transaction while unselected
    pub accepting: bool,
    pub selected: bool,
    /// Every word the channel clocked out
    pub sent: Vec<u16>,
    /// Successful exchanges so far
    pub exchanges: usize,
    /// Fail the exchange attempted once this many have succeeded
    pub fail_at: Option<usize>,
    /// nss transitions, true for assert
    pub select_log: Vec<bool>,
    pub frequency: u32,
    pub format: Option<BusFormat>,
    pub delays: u32,
    /// Replies queued once `delays` reaches the given count
    pub late_replies: Option<(u32, Vec<u16>)>,
    /// data-ready reads low for this many samples
    pub quiet_samples: u32,
    /// data-ready samples taken
    pub samples: u32,
}

pub struct MockBus(pub Rc<RefCell<Peer>>);

pub struct MockLines(pub Rc<RefCell<Peer>>);

pub fn mock(accepting: bool) -> (MockBus, MockLines, Rc<RefCell<Peer>>) {
    let peer = Rc::new(RefCell::new(Peer {
        accepting,
        ..Default::default()
    }));
    (MockBus(peer.clone()), MockLines(peer.clone()), peer)
}

impl WordExchange for MockBus {
    fn set_frequency(&mut self, hz: u32) -> Result<()> {
        self.0.borrow_mut().frequency = hz;
        Ok(())
    }

    fn set_format(&mut self, format: BusFormat) -> Result<()> {
        self.0.borrow_mut().format = Some(format);
        Ok(())
    }

    fn exchange_word(&mut self, out: u16) -> Result<u16> {
        let mut peer = self.0.borrow_mut();
        if peer.fail_at == Some(peer.exchanges) {
            peer.fail_at = None;
            return Err(Error::TransferFailed);
        }
        peer.exchanges += 1;
        peer.sent.push(out);
        Ok(peer.replies.pop_front().unwrap_or(0))
    }

    fn delay_us(&mut self, _us: u32) {
        let mut peer = self.0.borrow_mut();
        peer.delays += 1;
        let due = matches!(&peer.late_replies, Some((at, _)) if *at <= peer.delays);
        if due {
            if let Some((_, words)) = peer.late_replies.take() {
                peer.replies.extend(words);
            }
        }
    }
}

impl FlowControlLine for MockLines {
    fn assert_select(&mut self) {
        let mut peer = self.0.borrow_mut();
        peer.selected = true;
        peer.select_log.push(true);
    }

    fn deassert_select(&mut self) {
        let mut peer = self.0.borrow_mut();
        peer.selected = false;
        peer.select_log.push(false);
    }

    fn is_selected(&self) -> bool {
        self.0.borrow().selected
    }

    fn peer_has_data(&mut self) -> bool {
        let mut peer = self.0.borrow_mut();
        peer.samples += 1;
        if peer.samples <= peer.quiet_samples {
            return false;
        }
        !peer.replies.is_empty() || (peer.accepting && !peer.selected)
    }
}
