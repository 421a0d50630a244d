use std::io::Read;
use std::mem;

use tracing::{debug, warn};

use bombshell_frame::{FrameEvent, FrameReader};
use bombshell_stream::Sink;

use crate::error::{RelayError, Result};

enum SinkState {
    Open(Box<dyn Sink>),
    /// The sink's own write failed; later data frames for the channel are
    /// drained until its end-of-stream marker arrives.
    Failed,
    Closed,
}

/// Fans one framed source out to N sinks.
///
/// Each data frame is written and flushed to the sink whose index matches
/// the frame's channel. An EOF frame closes the sink (dropping it, which
/// releases the descriptor). The run ends when every sink is closed, or
/// immediately when the transport itself closes at a frame boundary.
pub struct Demultiplexer<R> {
    reader: FrameReader<R>,
    sinks: Vec<SinkState>,
    remaining: usize,
}

impl<R: Read> Demultiplexer<R> {
    /// Build a demultiplexer. Sink order assigns channel ids: `sinks[c]`
    /// receives channel `c`.
    pub fn new(source: R, sinks: Vec<Box<dyn Sink>>) -> Self {
        let remaining = sinks.len();
        Self {
            reader: FrameReader::new(source),
            sinks: sinks.into_iter().map(SinkState::Open).collect(),
            remaining,
        }
    }

    /// Run until every channel has been closed or the transport ends.
    pub fn run(&mut self) -> Result<()> {
        while self.remaining > 0 {
            match self.reader.read_event()? {
                None => {
                    debug!("transport closed; releasing remaining sinks");
                    self.close_all();
                    return Ok(());
                }
                Some(FrameEvent::Data { channel, payload }) => {
                    self.deliver(channel, &payload)?;
                }
                Some(FrameEvent::Eof { channel }) => {
                    self.close(channel)?;
                }
            }
        }
        debug!("all channels closed");
        Ok(())
    }

    fn index(&self, channel: u16) -> Result<usize> {
        let idx = channel as usize;
        if idx >= self.sinks.len() {
            return Err(RelayError::Protocol(format!(
                "frame for unknown channel {channel}"
            )));
        }
        Ok(idx)
    }

    fn deliver(&mut self, channel: u16, payload: &[u8]) -> Result<()> {
        let idx = self.index(channel)?;
        let failed = match &mut self.sinks[idx] {
            SinkState::Open(sink) => {
                match sink.write_all(payload).and_then(|()| sink.flush()) {
                    Ok(()) => false,
                    Err(err) => {
                        warn!(channel, error = %err, "sink write failed; draining channel");
                        true
                    }
                }
            }
            SinkState::Failed => return Ok(()),
            SinkState::Closed => {
                return Err(RelayError::Protocol(format!(
                    "data after end-of-stream on channel {channel}"
                )));
            }
        };
        if failed {
            // Dropping the sink here lets its consumer observe closure
            // right away instead of at session end.
            self.sinks[idx] = SinkState::Failed;
        }
        Ok(())
    }

    fn close(&mut self, channel: u16) -> Result<()> {
        let idx = self.index(channel)?;
        match mem::replace(&mut self.sinks[idx], SinkState::Closed) {
            SinkState::Open(mut sink) => {
                let _ = sink.flush();
                debug!(channel, "channel closed");
                self.remaining -= 1;
                Ok(())
            }
            SinkState::Failed => {
                self.remaining -= 1;
                Ok(())
            }
            SinkState::Closed => Err(RelayError::Protocol(format!(
                "duplicate end-of-stream for channel {channel}"
            ))),
        }
    }

    fn close_all(&mut self) {
        for state in &mut self.sinks {
            *state = SinkState::Closed;
        }
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    use bytes::BytesMut;

    use bombshell_frame::{encode_data, encode_eof};

    use super::*;

    /// Clonable in-memory sink so tests can observe writes and closure.
    #[derive(Clone, Default)]
    struct SharedSink {
        state: Arc<Mutex<SharedSinkState>>,
    }

    #[derive(Default)]
    struct SharedSinkState {
        bytes: Vec<u8>,
        flushes: usize,
        fail_writes: bool,
    }

    impl SharedSink {
        fn new() -> Self {
            Self::default()
        }

        fn failing() -> Self {
            let sink = Self::default();
            sink.state.lock().unwrap().fail_writes = true;
            sink
        }

        fn bytes(&self) -> Vec<u8> {
            self.state.lock().unwrap().bytes.clone()
        }

        fn flushes(&self) -> usize {
            self.state.lock().unwrap().flushes
        }
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
            }
            state.bytes.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.state.lock().unwrap().flushes += 1;
            Ok(())
        }
    }

    fn wire(build: impl FnOnce(&mut BytesMut)) -> Cursor<Vec<u8>> {
        let mut buf = BytesMut::new();
        build(&mut buf);
        Cursor::new(buf.to_vec())
    }

    #[test]
    fn dispatches_payloads_by_channel() {
        let source = wire(|buf| {
            encode_data(0, b"to-zero", buf).unwrap();
            encode_data(1, b"to-one", buf).unwrap();
            encode_data(0, b"-more", buf).unwrap();
            encode_eof(0, buf);
            encode_eof(1, buf);
        });

        let sink0 = SharedSink::new();
        let sink1 = SharedSink::new();
        let mut demux = Demultiplexer::new(
            source,
            vec![Box::new(sink0.clone()), Box::new(sink1.clone())],
        );
        demux.run().unwrap();

        assert_eq!(sink0.bytes(), b"to-zero-more");
        assert_eq!(sink1.bytes(), b"to-one");
    }

    #[test]
    fn every_delivery_flushes() {
        let source = wire(|buf| {
            encode_data(0, b"a", buf).unwrap();
            encode_data(0, b"b", buf).unwrap();
            encode_eof(0, buf);
        });

        let sink = SharedSink::new();
        let mut demux = Demultiplexer::new(source, vec![Box::new(sink.clone())]);
        demux.run().unwrap();

        // Two data flushes plus the closing flush.
        assert_eq!(sink.flushes(), 3);
    }

    #[test]
    fn transport_eof_closes_all_sinks() {
        let source = wire(|buf| {
            encode_data(0, b"partial", buf).unwrap();
        });

        let sink0 = SharedSink::new();
        let sink1 = SharedSink::new();
        let mut demux = Demultiplexer::new(
            source,
            vec![Box::new(sink0.clone()), Box::new(sink1.clone())],
        );
        demux.run().unwrap();

        assert_eq!(sink0.bytes(), b"partial");
        assert!(sink1.bytes().is_empty());
    }

    #[test]
    fn duplicate_eof_is_a_protocol_error() {
        let source = wire(|buf| {
            encode_eof(0, buf);
            encode_eof(0, buf);
        });

        let sink0 = SharedSink::new();
        let sink1 = SharedSink::new();
        let mut demux = Demultiplexer::new(
            source,
            vec![Box::new(sink0), Box::new(sink1)],
        );

        let err = demux.run().unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[test]
    fn data_after_eof_is_a_protocol_error() {
        let source = wire(|buf| {
            encode_eof(0, buf);
            encode_data(0, b"zombie", buf).unwrap();
            encode_eof(1, buf);
        });

        let mut demux = Demultiplexer::new(
            source,
            vec![Box::new(SharedSink::new()), Box::new(SharedSink::new())],
        );

        let err = demux.run().unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[test]
    fn unknown_channel_is_a_protocol_error() {
        let source = wire(|buf| {
            encode_data(5, b"lost", buf).unwrap();
        });

        let mut demux = Demultiplexer::new(source, vec![Box::new(SharedSink::new())]);
        let err = demux.run().unwrap_err();
        assert!(matches!(err, RelayError::Protocol(_)));
    }

    #[test]
    fn truncated_frame_is_fatal() {
        let mut buf = BytesMut::new();
        encode_data(0, b"complete", &mut buf).unwrap();
        let mut bytes = buf.to_vec();
        bytes.truncate(bytes.len() - 3);

        let mut demux =
            Demultiplexer::new(Cursor::new(bytes), vec![Box::new(SharedSink::new())]);
        let err = demux.run().unwrap_err();
        assert!(matches!(
            err,
            RelayError::Frame(bombshell_frame::FrameError::Truncated)
        ));
    }

    #[test]
    fn failed_sink_drains_until_its_eof() {
        let source = wire(|buf| {
            encode_data(0, b"boom", buf).unwrap();
            encode_data(0, b"drained", buf).unwrap();
            encode_data(1, b"healthy", buf).unwrap();
            encode_eof(0, buf);
            encode_eof(1, buf);
        });

        let broken = SharedSink::failing();
        let healthy = SharedSink::new();
        let mut demux = Demultiplexer::new(
            source,
            vec![Box::new(broken.clone()), Box::new(healthy.clone())],
        );
        demux.run().unwrap();

        assert!(broken.bytes().is_empty());
        assert_eq!(healthy.bytes(), b"healthy");
    }

    #[test]
    fn mux_to_demux_byte_equality() {
        use std::os::unix::net::UnixStream;
        use std::thread;

        let (mut tx0, rx0) = UnixStream::pair().unwrap();
        let (mut tx1, rx1) = UnixStream::pair().unwrap();

        let feeder = thread::spawn(move || {
            tx0.write_all(b"stream-zero").unwrap();
            tx1.write_all(b"stream-one").unwrap();
        });

        let mut mux = crate::Multiplexer::new(vec![Box::new(rx0), Box::new(rx1)], Vec::new());
        mux.run().unwrap();
        feeder.join().unwrap();

        let sink0 = SharedSink::new();
        let sink1 = SharedSink::new();
        let mut demux = Demultiplexer::new(
            Cursor::new(mux.into_sink()),
            vec![Box::new(sink0.clone()), Box::new(sink1.clone())],
        );
        demux.run().unwrap();

        assert_eq!(sink0.bytes(), b"stream-zero");
        assert_eq!(sink1.bytes(), b"stream-one");
    }
}
