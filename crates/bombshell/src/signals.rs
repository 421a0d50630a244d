//! Signal forwarding between the peers.
//!
//! Locally, [`SignalSender`] intercepts the forwarded signal set and
//! encodes each delivery as a 2-byte big-endian event on an internal pipe;
//! the pipe's read end is a multiplexer source, so events travel the
//! transport as ordinary frames on the signal channel. Remotely,
//! [`run_signaler`] consumes the matching demultiplexer sink and replays
//! each event against the supervised child with `kill`.
//!
//! The OS handler itself only records the signal number; everything that
//! does I/O runs on a normal worker thread.

use std::io::{self, Read, Write};
use std::thread::JoinHandle;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use signal_hook::consts::{SIGABRT, SIGALRM, SIGCONT, SIGINT, SIGTERM, SIGTSTP, SIGUSR1, SIGUSR2};
use signal_hook::iterator::{Handle, Signals};
use tracing::{debug, warn};

/// Signals intercepted locally and replayed against the remote child.
pub const FORWARDED_SIGNALS: [i32; 8] = [
    SIGINT, SIGABRT, SIGALRM, SIGTERM, SIGUSR1, SIGUSR2, SIGTSTP, SIGCONT,
];

/// Intercepts signals and feeds them into the relay as events.
pub struct SignalSender {
    handle: Handle,
    worker: Option<JoinHandle<()>>,
}

impl SignalSender {
    /// Install handlers for [`FORWARDED_SIGNALS`] and start the worker
    /// that drains them into `pipe`, one flushed 2-byte event per signal,
    /// in delivery order. Signals arriving between installation and the
    /// first drain are buffered, not lost.
    pub fn start<W: Write + Send + 'static>(mut pipe: W) -> io::Result<Self> {
        let mut signals = Signals::new(FORWARDED_SIGNALS)?;
        let handle = signals.handle();

        let worker = std::thread::spawn(move || {
            for signum in signals.forever() {
                debug!(signum, "forwarding signal");
                let event = (signum as u16).to_be_bytes();
                if pipe.write_all(&event).and_then(|()| pipe.flush()).is_err() {
                    // The relay is gone; nothing left to forward to.
                    break;
                }
            }
        });

        Ok(Self {
            handle,
            worker: Some(worker),
        })
    }

    /// Stop intercepting and join the worker. Dropping the worker's pipe
    /// end is what signals end-of-stream on the signal channel.
    pub fn shutdown(mut self) {
        self.handle.close();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for SignalSender {
    fn drop(&mut self) {
        self.handle.close();
    }
}

/// Replay signal events arriving on `pipe` against `pid` until the pipe
/// reaches end-of-stream.
///
/// A zero event is a protocol violation (the sender can never produce
/// one). An event naming a signal unknown to this platform is logged and
/// skipped. A trailing odd byte is logged and ends the run.
pub fn run_signaler<R: Read>(mut pipe: R, pid: Pid) -> io::Result<()> {
    let mut event = [0u8; 2];
    while read_event(&mut pipe, &mut event)? {
        let signum = u16::from_be_bytes(event);
        if signum == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "zero signal event",
            ));
        }
        match Signal::try_from(i32::from(signum)) {
            Ok(signal) => {
                debug!(%signal, "delivering forwarded signal");
                if let Err(err) = kill(pid, signal) {
                    warn!(%signal, error = %err, "signal delivery failed");
                }
            }
            Err(_) => warn!(signum, "unknown signal number; skipping"),
        }
    }
    Ok(())
}

/// Fill `event` from the pipe. Returns `Ok(false)` on end-of-stream.
fn read_event<R: Read>(pipe: &mut R, event: &mut [u8; 2]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < event.len() {
        match pipe.read(&mut event[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                warn!("signal pipe closed mid-event");
                return Ok(false);
            }
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(true)
}
