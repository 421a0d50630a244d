//! Local peer: launch supervision and the user-facing data phase.
//!
//! The handshake runs under the per-user lock: spawn the transport helper,
//! ship the bootstrap line and the launch request, await the confirmation.
//! Only a confirmed launch proceeds to the data phase, where two relay
//! threads carry `[stdin, signals]` outward and `[stdout, stderr]` inward.

use std::io::{self, ErrorKind, Write};
use std::os::unix::process::CommandExt;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;

use tracing::{debug, warn};

use bombshell_frame::control::{self, CommandRequest};
use bombshell_frame::{CH_SIGNAL, CH_STDERR, CH_STDIN, CH_STDOUT};
use bombshell_relay::{Demultiplexer, Multiplexer};
use bombshell_stream::{pipe_pair, FdStream, Sink, Source};

use crate::exit::{
    io_error, status_code, stream_error, CliError, CliResult, DOMAIN_UNREACHABLE, NOT_FOUND,
};
use crate::lock::HandshakeLock;
use crate::signals::SignalSender;

/// Environment override for the transport helper program.
pub const HELPER_ENV: &str = "BOMBSHELL_HELPER";
/// Environment override for the agent program named in the bootstrap line.
pub const AGENT_ENV: &str = "BOMBSHELL_AGENT";

const DEFAULT_HELPER: &str = "qrexec-client-vm";
const DEFAULT_AGENT: &str = "bombshell-agent";
/// Qubes RPC service that hands us a shell in the target domain.
const VM_SHELL_SERVICE: &str = "qubes.VMShell";

/// Run `command` in `domain`, relaying stdio and signals until the remote
/// side shuts down. Returns the exit code to report: the remote child's
/// own code, carried back as the transport helper's exit status.
pub fn run(domain: &str, command: &[String], verbose: bool) -> CliResult<i32> {
    let lock = HandshakeLock::acquire().map_err(|err| io_error("cannot take handshake lock", err))?;

    // Pin the caller's stderr now, while it is still the original
    // descriptor; the demultiplexer writes the child's stderr there.
    let saved_stderr =
        FdStream::stderr().map_err(|err| stream_error("cannot pin original stderr", err))?;

    let mut helper = spawn_helper(helper_program().as_str(), domain)?;
    let mut helper_stdin = helper
        .stdin
        .take()
        .ok_or_else(|| CliError::new(1, "transport helper has no stdin"))?;
    let mut helper_stdout = helper
        .stdout
        .take()
        .ok_or_else(|| CliError::new(1, "transport helper has no stdout"))?;

    write_bootstrap(&mut helper_stdin, verbose)?;
    let request = CommandRequest::new(command.iter().cloned());
    control::write_command(&mut helper_stdin, &request).map_err(handshake_send_error)?;

    let (status, message) =
        control::read_confirmation(&mut helper_stdout).map_err(|err| CliError::new(1, format!("handshake failed: {err}")))?;
    drop(lock);

    if status != control::STATUS_LAUNCHED {
        reap_helper(&mut helper);
        return Err(CliError::new(i32::from(status), message));
    }
    debug!(%domain, "remote command launched");

    let code = relay_session(helper_stdin, helper_stdout, saved_stderr, &mut helper)?;
    Ok(code)
}

/// Wire up both relay directions and wait for the helper to exit.
fn relay_session(
    helper_stdin: ChildStdin,
    helper_stdout: ChildStdout,
    saved_stderr: FdStream,
    helper: &mut Child,
) -> CliResult<i32> {
    let (signal_rx, signal_tx) =
        pipe_pair().map_err(|err| stream_error("cannot create signal pipe", err))?;
    let sender = SignalSender::start(signal_tx)
        .map_err(|err| io_error("cannot install signal handlers", err))?;

    let stdin = FdStream::stdin().map_err(|err| stream_error("cannot duplicate stdin", err))?;
    debug!(
        stdin = CH_STDIN,
        signals = CH_SIGNAL,
        stdout = CH_STDOUT,
        stderr = CH_STDERR,
        "wiring relay channels"
    );

    // Stream order fixes the channel ids declared above.
    let sources: Vec<Box<dyn Source>> = vec![Box::new(stdin), Box::new(signal_rx)];
    let mut mux = Multiplexer::new(sources, helper_stdin);
    thread::Builder::new()
        .name("mux".into())
        .spawn(move || {
            if let Err(err) = mux.run() {
                warn!(error = %err, "outbound relay failed");
            }
        })
        .map_err(|err| io_error("cannot start outbound relay", err))?;

    let stdout =
        FdStream::stdout().map_err(|err| stream_error("cannot duplicate stdout", err))?;
    let sinks: Vec<Box<dyn Sink>> = vec![Box::new(stdout), Box::new(saved_stderr)];
    let mut demux = Demultiplexer::new(helper_stdout, sinks);
    let demux_thread = thread::Builder::new()
        .name("demux".into())
        .spawn(move || {
            if let Err(err) = demux.run() {
                warn!(error = %err, "inbound relay failed");
            }
        })
        .map_err(|err| io_error("cannot start inbound relay", err))?;

    let status = helper
        .wait()
        .map_err(|err| io_error("cannot wait for transport helper", err))?;
    let _ = demux_thread.join();
    drop(sender);

    debug!(?status, "transport helper exited");
    Ok(status_code(status))
}

fn helper_program() -> String {
    std::env::var(HELPER_ENV).unwrap_or_else(|_| DEFAULT_HELPER.to_string())
}

fn agent_program() -> String {
    std::env::var(AGENT_ENV).unwrap_or_else(|_| DEFAULT_AGENT.to_string())
}

/// Start the transport helper with piped stdin/stdout and inherited
/// stderr, in its own process group so terminal-generated signals reach
/// only this peer, which forwards them explicitly.
fn spawn_helper(helper: &str, domain: &str) -> CliResult<Child> {
    debug!(%helper, %domain, "starting transport helper");
    Command::new(helper)
        .arg(domain)
        .arg(VM_SHELL_SERVICE)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .process_group(0)
        .spawn()
        .map_err(|err| CliError::new(NOT_FOUND, format!("cannot start {helper}: {err}")))
}

/// One shell line that replaces the remote shell with the agent.
/// Everything after it on the transport belongs to the agent's protocol
/// stream.
fn bootstrap_line(agent: &str, verbose: bool) -> CliResult<String> {
    let quoted = shlex::try_quote(agent)
        .map_err(|err| CliError::new(1, format!("agent program name cannot be quoted: {err}")))?;
    Ok(if verbose {
        format!("exec {quoted} -d\n")
    } else {
        format!("exec {quoted}\n")
    })
}

fn write_bootstrap<W: Write>(out: &mut W, verbose: bool) -> CliResult<()> {
    let line = bootstrap_line(agent_program().as_str(), verbose)?;
    out.write_all(line.as_bytes())
        .and_then(|()| out.flush())
        .map_err(handshake_send_io_error)
}

/// A helper that dies before reading the handshake presents as a broken
/// pipe; that is the same "nobody answered" condition as a silent
/// confirmation stream.
fn handshake_send_io_error(err: io::Error) -> CliError {
    if err.kind() == ErrorKind::BrokenPipe {
        CliError::new(DOMAIN_UNREACHABLE, control::UNREACHABLE_MSG)
    } else {
        io_error("handshake send failed", err)
    }
}

fn handshake_send_error(err: bombshell_frame::FrameError) -> CliError {
    match err {
        bombshell_frame::FrameError::Io(err) => handshake_send_io_error(err),
        other => CliError::new(1, format!("handshake send failed: {other}")),
    }
}

/// The helper is about to be abandoned after a failed launch; collect it
/// so it does not linger as a zombie while the error propagates.
fn reap_helper(helper: &mut Child) {
    let _ = helper.wait();
}
