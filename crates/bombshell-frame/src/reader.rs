use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_event, FrameEvent};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally. `Ok(None)` reports that the transport
/// closed cleanly at a frame boundary; a close in the middle of a frame is
/// a protocol error.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Read the next frame (blocking).
    pub fn read_event(&mut self) -> Result<Option<FrameEvent>> {
        loop {
            if let Some(event) = decode_event(&mut self.buf)? {
                return Ok(Some(event));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Err(FrameError::Truncated);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
