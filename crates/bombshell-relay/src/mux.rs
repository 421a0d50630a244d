use std::io::{self, ErrorKind, Write};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, warn};

use bombshell_frame::FrameWriter;
use bombshell_stream::{set_nonblocking, Source};

use crate::error::{RelayError, Result};

/// Per-read ceiling. Keeps one fast producer from monopolizing the
/// transport with oversized frames; readiness polling redistributes after
/// every chunk.
pub const READ_CEILING: usize = 64 * 1024;

/// Fans N sources into one framed sink.
///
/// Each source is read only when readiness polling says it has bytes, one
/// frame per OS read. A zero-byte read retires the source and emits the
/// channel's end-of-stream marker; the run ends when every source has been
/// retired.
pub struct Multiplexer<W> {
    sources: Vec<Option<Box<dyn Source>>>,
    writer: FrameWriter<W>,
    live: usize,
}

impl<W: Write> Multiplexer<W> {
    /// Build a multiplexer. Source order assigns channel ids: `sources[c]`
    /// feeds channel `c`.
    pub fn new(sources: Vec<Box<dyn Source>>, sink: W) -> Self {
        let live = sources.len();
        Self {
            sources: sources.into_iter().map(Some).collect(),
            writer: FrameWriter::new(sink),
            live,
        }
    }

    /// Run until every source has reached end-of-stream.
    pub fn run(&mut self) -> Result<()> {
        for source in self.sources.iter().flatten() {
            set_nonblocking(source.as_fd(), true)?;
        }

        let mut buf = vec![0u8; READ_CEILING];
        while self.live > 0 {
            for channel in self.poll_ready()? {
                self.service(channel, &mut buf)?;
            }
        }
        debug!("all sources drained");
        Ok(())
    }

    /// Consume the multiplexer and return the sink.
    pub fn into_sink(self) -> W {
        self.writer.into_inner()
    }

    /// Block until at least one live source is ready, returning its
    /// channels. Exceptional poll conditions are protocol failures.
    fn poll_ready(&self) -> Result<Vec<usize>> {
        let mut channels = Vec::with_capacity(self.live);
        let mut fds = Vec::with_capacity(self.live);
        for (channel, source) in self.sources.iter().enumerate() {
            if let Some(source) = source {
                channels.push(channel);
                fds.push(PollFd::new(source.as_fd(), PollFlags::POLLIN));
            }
        }

        loop {
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(n) if n > 0 => break,
                Ok(_) => continue,
                Err(Errno::EINTR) => continue,
                Err(err) => return Err(RelayError::Io(io::Error::from(err))),
            }
        }

        let mut ready = Vec::new();
        for (slot, &channel) in channels.iter().enumerate() {
            let revents = fds[slot].revents().unwrap_or(PollFlags::empty());
            if revents.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
                return Err(RelayError::Protocol(format!(
                    "exceptional poll condition on channel {channel}"
                )));
            }
            // POLLHUP still allows draining buffered bytes; the following
            // read observes either data or the actual end-of-stream.
            if revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP) {
                ready.push(channel);
            }
        }
        Ok(ready)
    }

    fn service(&mut self, channel: usize, buf: &mut [u8]) -> Result<()> {
        let Some(source) = self.sources[channel].as_mut() else {
            return Ok(());
        };
        match source.read(buf) {
            Ok(0) => self.retire(channel, None),
            Ok(n) => {
                self.writer.send(channel as u16, &buf[..n])?;
                Ok(())
            }
            Err(err)
                if err.kind() == ErrorKind::WouldBlock
                    || err.kind() == ErrorKind::Interrupted =>
            {
                Ok(())
            }
            Err(err) => self.retire(channel, Some(err)),
        }
    }

    /// Retire a source: emit the channel's end-of-stream marker and remove
    /// it from the live set. A read error counts as premature
    /// end-of-stream for that channel; the other channels continue.
    fn retire(&mut self, channel: usize, err: Option<io::Error>) -> Result<()> {
        match err {
            Some(err) => warn!(channel, error = %err, "source failed; ending its channel"),
            None => debug!(channel, "source reached end-of-stream"),
        }
        self.sources[channel] = None;
        self.live -= 1;
        self.writer.send_eof(channel as u16)?;
        Ok(())
    }
}
