//! Interrupt bridge
//!
//! Holds one optional handler per interrupt slot and the arming state of
//! each interrupt source. The channel arms RxIrq while it is open and arms
//! TxIrq while the tx buffer holds data; a TxIrq notification is delivered
//! once when that buffer drains.
//!
//! Handlers are borrowed closures. Their lifetime is managed by the caller,
//! who must detach a handler before its captured context goes away; the
//! borrow checker enforces this through the `'a` lifetime.

use bitflags::bitflags;

/// Interrupt slot a handler can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrqType {
    /// New rx data arrived in the rx buffer
    Rx = 0,
    /// The tx buffer went from non-empty to empty
    Tx = 1,
}

impl IrqType {
    /// Number of slots
    pub const COUNT: usize = 2;

    /// Every slot, in index order
    pub const ALL: [IrqType; Self::COUNT] = [IrqType::Rx, IrqType::Tx];

    const fn index(self) -> usize {
        self as usize
    }
}

bitflags! {
    /// Set of armed interrupt sources
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct IrqMask: u8 {
        /// Data-ready / rx source
        const RX = 1 << 0;
        /// Tx-buffer-empty source
        const TX = 1 << 1;
    }
}

impl Default for IrqMask {
    fn default() -> Self {
        IrqMask::empty()
    }
}

impl From<IrqType> for IrqMask {
    fn from(slot: IrqType) -> Self {
        match slot {
            IrqType::Rx => IrqMask::RX,
            IrqType::Tx => IrqMask::TX,
        }
    }
}

/// Handler invoked from whatever context delivers the notification
///
/// `Sync` so a channel holding handlers can be shared with an interrupt
/// handler through a `static`.
pub type Callback<'a> = &'a (dyn Fn() + Sync);

/// Tagged slot table mapping each [`IrqType`] to an optional handler
pub struct InterruptBridge<'a> {
    slots: [Option<Callback<'a>>; IrqType::COUNT],
    armed: IrqMask,
}

impl<'a> InterruptBridge<'a> {
    /// Create a bridge with no handler and nothing armed
    pub const fn new() -> Self {
        Self {
            slots: [None, None],
            armed: IrqMask::empty(),
        }
    }

    /// Store or replace the handler for `slot`
    ///
    /// Passing `None` is equivalent to [`unregister`](Self::unregister).
    /// The last registration wins.
    pub fn register(&mut self, slot: IrqType, handler: Option<Callback<'a>>) {
        self.slots[slot.index()] = handler;
    }

    /// Clear the handler for `slot`
    pub fn unregister(&mut self, slot: IrqType) {
        self.slots[slot.index()] = None;
    }

    /// Returns true if a handler is attached to `slot`
    pub fn is_registered(&self, slot: IrqType) -> bool {
        self.slots[slot.index()].is_some()
    }

    /// Invoke the handler for `slot`, if any
    ///
    /// Returns true if a handler ran.
    pub fn notify(&self, slot: IrqType) -> bool {
        match self.slots[slot.index()] {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    /// Enable the given interrupt sources
    pub fn arm(&mut self, mask: IrqMask) {
        self.armed.insert(mask);
    }

    /// Disable the given interrupt sources
    pub fn disarm(&mut self, mask: IrqMask) {
        self.armed.remove(mask);
    }

    /// Returns true if the source behind `slot` is enabled
    pub fn is_armed(&self, slot: IrqType) -> bool {
        self.armed.contains(slot.into())
    }

    /// Currently enabled sources
    pub fn armed(&self) -> IrqMask {
        self.armed
    }
}

impl Default for InterruptBridge<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for InterruptBridge<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InterruptBridge")
            .field("rx_handler", &self.is_registered(IrqType::Rx))
            .field("tx_handler", &self.is_registered(IrqType::Tx))
            .field("armed", &self.armed)
            .finish()
    }
}
