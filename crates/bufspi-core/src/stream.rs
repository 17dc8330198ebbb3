//! File-handle style stream interface
//!
//! [`ByteStream`] is the contract a buffered channel presents to code that
//! treats it like a file handle. The `*_raw` adapters report failures as
//! negative errno values for callers that speak that convention (for
//! example a libc-style file table).
//!
//! The channel also implements the `embedded-io` traits so it can be
//! handed to any driver written against them.

use embedded_io::{ErrorType, Read, ReadReady, Seek, SeekFrom, Write, WriteReady};

use crate::bus::WordExchange;
use crate::channel::BufferedSpiChannel;
use crate::error::{errno, Error, Result};
use crate::flow::FlowControlLine;

/// Byte stream with file-handle semantics
pub trait ByteStream {
    /// Read up to `buf.len()` bytes
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write `data`, returning the number of bytes accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Release the stream
    fn close(&mut self) -> Result<()>;

    /// Reposition the stream
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Returns true if a read would return data without waiting
    fn readable(&self) -> bool;

    /// Returns true if a write would be accepted without waiting
    fn writeable(&self) -> bool;

    /// [`read`](Self::read) returning a byte count or a negative errno
    fn read_raw(&mut self, buf: &mut [u8]) -> isize {
        match self.read(buf) {
            Ok(n) => n as isize,
            Err(e) => e.errno() as isize,
        }
    }

    /// [`write`](Self::write) returning a byte count or a negative errno
    fn write_raw(&mut self, data: &[u8]) -> isize {
        match self.write(data) {
            Ok(n) => n as isize,
            Err(e) => e.errno() as isize,
        }
    }

    /// [`close`](Self::close) returning 0 or a negative errno
    fn close_raw(&mut self) -> i32 {
        match self.close() {
            Ok(()) => 0,
            Err(e) => e.errno(),
        }
    }

    /// [`seek`](Self::seek) taking lseek-style arguments
    ///
    /// `whence` is 0 (SEEK_SET), 1 (SEEK_CUR) or 2 (SEEK_END). Returns the
    /// new position or a negative errno.
    fn seek_raw(&mut self, offset: i64, whence: i32) -> i64 {
        let pos = match whence {
            0 if offset >= 0 => SeekFrom::Start(offset as u64),
            1 => SeekFrom::Current(offset),
            2 => SeekFrom::End(offset),
            _ => return -errno::EINVAL as i64,
        };
        match self.seek(pos) {
            Ok(p) => p as i64,
            Err(e) => e.errno() as i64,
        }
    }
}

/// Runtime bus reconfiguration
pub trait ConfigurableBus {
    /// Set the bus clock in Hz
    fn frequency(&mut self, hz: u32) -> Result<()>;

    /// Set word width in bits and SPI mode number
    fn format(&mut self, bits: u8, mode: u8) -> Result<()>;
}

impl<B: WordExchange, L: FlowControlLine> ByteStream for BufferedSpiChannel<'_, B, L> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        BufferedSpiChannel::read(self, buf)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        BufferedSpiChannel::write(self, data)
    }

    fn close(&mut self) -> Result<()> {
        BufferedSpiChannel::close(self)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        BufferedSpiChannel::seek(self, pos)
    }

    fn readable(&self) -> bool {
        BufferedSpiChannel::readable(self)
    }

    fn writeable(&self) -> bool {
        BufferedSpiChannel::writeable(self)
    }

    // Not seekable whatever the arguments
    fn seek_raw(&mut self, _offset: i64, _whence: i32) -> i64 {
        Error::NotSeekable.errno() as i64
    }
}

impl<B: WordExchange, L: FlowControlLine> ConfigurableBus for BufferedSpiChannel<'_, B, L> {
    fn frequency(&mut self, hz: u32) -> Result<()> {
        BufferedSpiChannel::frequency(self, hz)
    }

    fn format(&mut self, bits: u8, mode: u8) -> Result<()> {
        BufferedSpiChannel::format(self, bits, mode)
    }
}

impl<B: WordExchange, L: FlowControlLine> ErrorType for BufferedSpiChannel<'_, B, L> {
    type Error = Error;
}

impl<B: WordExchange, L: FlowControlLine> Read for BufferedSpiChannel<'_, B, L> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        BufferedSpiChannel::read(self, buf)
    }
}

impl<B: WordExchange, L: FlowControlLine> Write for BufferedSpiChannel<'_, B, L> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        BufferedSpiChannel::write(self, buf)
    }

    fn flush(&mut self) -> Result<()> {
        BufferedSpiChannel::flush(self)
    }
}

impl<B: WordExchange, L: FlowControlLine> ReadReady for BufferedSpiChannel<'_, B, L> {
    fn read_ready(&mut self) -> Result<bool> {
        Ok(self.readable())
    }
}

impl<B: WordExchange, L: FlowControlLine> WriteReady for BufferedSpiChannel<'_, B, L> {
    fn write_ready(&mut self) -> Result<bool> {
        Ok(self.writeable())
    }
}

impl<B: WordExchange, L: FlowControlLine> Seek for BufferedSpiChannel<'_, B, L> {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        BufferedSpiChannel::seek(self, pos)
    }
}
