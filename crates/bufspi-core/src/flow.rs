//! Flow-control lines
//!
//! The peripheral is addressed through an active-low chip-select output
//! (nss) and signals readiness through a data-ready input. The channel
//! samples data-ready before starting a transfer and between words, never
//! while a word is on the bus.

/// nss output plus data-ready input
///
/// Line operations are infallible, like the chip-select of a bitbang
/// master. Implementations backed by fallible I/O should log the failure
/// and report data-ready low.
pub trait FlowControlLine {
    /// Drive nss low to address the peripheral
    fn assert_select(&mut self);

    /// Drive nss high to end the transaction
    fn deassert_select(&mut self);

    /// Current electrical state of nss (true when asserted)
    fn is_selected(&self) -> bool;

    /// Sample the data-ready input
    ///
    /// No debouncing is done; the level is assumed stable at sample time.
    fn peer_has_data(&mut self) -> bool;
}

// Blanket impl for boxed lines to allow trait objects
impl<L: FlowControlLine + ?Sized> FlowControlLine for alloc::boxed::Box<L> {
    fn assert_select(&mut self) {
        (**self).assert_select()
    }

    fn deassert_select(&mut self) {
        (**self).deassert_select()
    }

    fn is_selected(&self) -> bool {
        (**self).is_selected()
    }

    fn peer_has_data(&mut self) -> bool {
        (**self).peer_has_data()
    }
}
