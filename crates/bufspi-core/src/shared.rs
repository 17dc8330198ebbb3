//! Channel shared between application code and an interrupt handler
//!
//! The channel's operations take `&mut self`, so within one execution
//! context they never overlap. When the data-ready interrupt runs in a
//! different context, both sides go through [`SharedChannel`], which wraps
//! the channel in a critical-section mutex. Application code and the
//! interrupt handler then never observe the rings or the state machine
//! half-updated.
//!
//! ```ignore
//! static WIFI: SharedChannel<'static, Spi, Lines> = SharedChannel::new(channel);
//!
//! #[interrupt]
//! fn EXTI1() {
//!     WIFI.on_interrupt();
//! }
//!
//! let n = WIFI.read(&mut buf)?;
//! ```
//!
//! Attached handlers run inside the critical section and must not call
//! back into the same `SharedChannel`.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::bus::WordExchange;
use crate::channel::BufferedSpiChannel;
use crate::error::{Error, Result};
use crate::flow::FlowControlLine;

/// Critical-section protected [`BufferedSpiChannel`]
pub struct SharedChannel<'a, B, L> {
    inner: Mutex<RefCell<BufferedSpiChannel<'a, B, L>>>,
}

impl<'a, B, L> SharedChannel<'a, B, L> {
    /// Wrap a channel
    ///
    /// This is a const fn, allowing static initialization.
    pub const fn new(channel: BufferedSpiChannel<'a, B, L>) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(channel)),
        }
    }

    /// Unwrap the channel
    pub fn into_inner(self) -> BufferedSpiChannel<'a, B, L> {
        self.inner.into_inner().into_inner()
    }
}

impl<'a, B: WordExchange, L: FlowControlLine> SharedChannel<'a, B, L> {
    /// Run `f` with exclusive access to the channel
    ///
    /// Interrupts are masked for the duration of `f`.
    pub fn with_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut BufferedSpiChannel<'a, B, L>) -> R,
    {
        critical_section::with(|cs| f(&mut self.inner.borrow_ref_mut(cs)))
    }

    /// Interrupt entry point for the data-ready line
    pub fn on_interrupt(&self) {
        self.with_mut(|spi| spi.on_data_ready());
    }

    /// Queue and send `data`
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        self.with_mut(|spi| spi.write(data))
    }

    /// Read from the channel
    ///
    /// In blocking mode the critical section is left between attempts so
    /// the interrupt handler can deliver data. Each attempt samples
    /// data-ready and asserts nss only once it is high, so waiting does not
    /// toggle nss.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            let (result, blocking) = self.with_mut(|spi| (spi.try_read(buf), spi.is_blocking()));
            match result {
                Err(Error::WouldBlock) if blocking => core::hint::spin_loop(),
                other => return other,
            }
        }
    }

    /// Returns true if the rx ring holds data
    pub fn readable(&self) -> bool {
        self.with_mut(|spi| spi.readable())
    }

    /// Close the channel
    pub fn close(&self) -> Result<()> {
        self.with_mut(|spi| spi.close())
    }
}
