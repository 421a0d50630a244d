//! Remote peer: child supervision on the far side of the transport.
//!
//! Started by the bootstrap line with stdin/stdout already wired to the
//! transport. Reads the launch request, spawns the child with piped stdio,
//! confirms the launch (or reports why not), then relays until the child
//! exits and reports its code as the process exit status.

use std::io;
use std::process::{Child, Command, Stdio};
use std::thread;

use nix::unistd::Pid;
use tracing::{debug, warn};

use bombshell_frame::control;
use bombshell_relay::{Demultiplexer, Multiplexer};
use bombshell_stream::{pipe_pair, FdStream, Sink, Source};

use crate::exit::{
    io_error, status_code, stream_error, CliError, CliResult, NOT_FOUND, SPAWN_FAILED,
};
use crate::signals;

/// Supervise one remote command. The confirmation always goes out, even
/// for a failed spawn; in that case the agent itself exits 0 and the
/// failure code travels inside the confirmation.
pub fn run() -> CliResult<i32> {
    // Unbuffered duplicates of the transport ends. Buffered stdin would
    // read ahead past the launch request and swallow data-phase frames.
    let mut transport_in =
        FdStream::stdin().map_err(|err| stream_error("cannot duplicate stdin", err))?;
    let mut transport_out =
        FdStream::stdout().map_err(|err| stream_error("cannot duplicate stdout", err))?;

    let request = control::read_command(&mut transport_in)
        .map_err(|err| CliError::new(1, format!("malformed launch request: {err}")))?;

    if request.argv.is_empty() {
        control::write_confirmation(&mut transport_out, SPAWN_FAILED as u16, "empty command")
            .map_err(confirmation_error)?;
        return Ok(0);
    }

    let mut child = match spawn_child(&request.argv) {
        Ok(child) => child,
        Err((status, message)) => {
            warn!(%message, "spawn failed");
            control::write_confirmation(&mut transport_out, status, &message)
                .map_err(confirmation_error)?;
            return Ok(0);
        }
    };
    control::write_confirmation(&mut transport_out, control::STATUS_LAUNCHED, "")
        .map_err(confirmation_error)?;
    debug!(command = %request.argv[0], pid = child.id(), "child launched");

    let code = relay_session(transport_in, transport_out, &mut child)?;
    Ok(code)
}

/// Wire up both relay directions and wait for the child.
fn relay_session(
    transport_in: FdStream,
    transport_out: FdStream,
    child: &mut Child,
) -> CliResult<i32> {
    let (signal_rx, signal_tx) =
        pipe_pair().map_err(|err| stream_error("cannot create signal pipe", err))?;
    let child_pid = Pid::from_raw(child.id() as i32);
    thread::Builder::new()
        .name("signaler".into())
        .spawn(move || {
            if let Err(err) = signals::run_signaler(signal_rx, child_pid) {
                warn!(error = %err, "signal relay failed");
            }
        })
        .map_err(|err| io_error("cannot start signal relay", err))?;

    let child_stdin = child
        .stdin
        .take()
        .ok_or_else(|| CliError::new(1, "child has no stdin"))?;
    let sinks: Vec<Box<dyn Sink>> = vec![Box::new(child_stdin), Box::new(signal_tx)];
    let mut demux = Demultiplexer::new(transport_in, sinks);
    thread::Builder::new()
        .name("demux".into())
        .spawn(move || {
            if let Err(err) = demux.run() {
                warn!(error = %err, "inbound relay failed");
            }
        })
        .map_err(|err| io_error("cannot start inbound relay", err))?;

    let child_stdout = child
        .stdout
        .take()
        .ok_or_else(|| CliError::new(1, "child has no stdout"))?;
    let child_stderr = child
        .stderr
        .take()
        .ok_or_else(|| CliError::new(1, "child has no stderr"))?;
    let sources: Vec<Box<dyn Source>> = vec![Box::new(child_stdout), Box::new(child_stderr)];
    let mut mux = Multiplexer::new(sources, transport_out);
    let mux_thread = thread::Builder::new()
        .name("mux".into())
        .spawn(move || {
            if let Err(err) = mux.run() {
                warn!(error = %err, "outbound relay failed");
            }
        })
        .map_err(|err| io_error("cannot start outbound relay", err))?;

    let status = child
        .wait()
        .map_err(|err| io_error("cannot wait for child", err))?;
    let _ = mux_thread.join();

    debug!(?status, "child exited");
    Ok(status_code(status))
}

/// Spawn the requested command with all three stdio streams piped.
///
/// A missing or non-executable program is reported as 127; every other
/// spawn failure as 126, matching what a shell would have exited with.
fn spawn_child(argv: &[String]) -> Result<Child, (u16, String)> {
    debug!(command = %argv[0], "spawning child");
    Command::new(&argv[0])
        .args(&argv[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            let status = match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => NOT_FOUND as u16,
                _ => SPAWN_FAILED as u16,
            };
            (status, format!("cannot execute {}: {err}", argv[0]))
        })
}

fn confirmation_error(err: bombshell_frame::FrameError) -> CliError {
    CliError::new(1, format!("cannot send launch confirmation: {err}"))
}
