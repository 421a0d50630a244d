use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::codec::{encode_data, encode_eof};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
///
/// Every frame is flushed before the call returns, so the peer never stalls
/// on bytes this side believes it already sent.
pub struct FrameWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Send one payload chunk on a channel.
    pub fn send(&mut self, channel: u16, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_data(channel, payload, &mut self.buf)?;
        self.write_buffered()
    }

    /// Send the end-of-stream marker for a channel.
    pub fn send_eof(&mut self, channel: u16) -> Result<()> {
        self.buf.clear();
        encode_eof(channel, &mut self.buf);
        self.write_buffered()
    }

    fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::Truncated),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
