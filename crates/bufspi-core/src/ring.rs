//! Fixed-capacity circular queue
//!
//! The buffer is allocated once with a runtime capacity and never grows.
//! When full, [`RingBuffer::push`] overwrites the oldest entry and reports
//! the loss through its return value.
//!
//! The buffer holds no lock. Callers sharing one buffer between application
//! and interrupt context must serialise access themselves (see
//! [`crate::shared`]).

use alloc::boxed::Box;
use alloc::vec;

/// Fixed-capacity circular queue with an overwrite-oldest policy
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: Box<[T]>,
    /// Index of the next slot to read from
    read: usize,
    /// Index of the next slot to write to
    write: usize,
    /// Number of valid entries
    count: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create an empty buffer holding at most `capacity` entries
    ///
    /// A capacity of zero is rounded up to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![T::default(); capacity.max(1)].into_boxed_slice(),
            read: 0,
            write: 0,
            count: 0,
        }
    }

    /// Append an item
    ///
    /// Returns `false` if the buffer was full and the oldest entry was
    /// overwritten to make room, `true` otherwise.
    pub fn push(&mut self, item: T) -> bool {
        let cap = self.buf.len();
        self.buf[self.write] = item;
        self.write = (self.write + 1) % cap;

        if self.count == cap {
            // The write cursor just passed the read cursor
            self.read = self.write;
            false
        } else {
            self.count += 1;
            true
        }
    }

    /// Remove and return the oldest entry
    pub fn pop(&mut self) -> Option<T> {
        if self.count == 0 {
            return None;
        }
        let item = self.buf[self.read];
        self.read = (self.read + 1) % self.buf.len();
        self.count -= 1;
        Some(item)
    }

    /// Return the oldest entry without consuming it
    pub fn peek(&self) -> Option<T> {
        self.get(0)
    }

    /// Return the entry `index` positions after the oldest one
    pub fn get(&self, index: usize) -> Option<T> {
        if index >= self.count {
            return None;
        }
        Some(self.buf[(self.read + index) % self.buf.len()])
    }

    /// Number of entries currently held
    pub fn available(&self) -> usize {
        self.count
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Free slots before the next push overwrites
    pub fn free(&self) -> usize {
        self.buf.len() - self.count
    }

    /// Returns true if no entry is held
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns true if the next push overwrites the oldest entry
    pub fn is_full(&self) -> bool {
        self.count == self.buf.len()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
        self.count = 0;
    }

    /// Iterate over held entries, oldest first, without consuming them
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.count).map(move |i| self.buf[(self.read + i) % self.buf.len()])
    }
}
