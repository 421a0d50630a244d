use std::fmt;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use bombshell_stream::StreamError;

/// The remote domain produced no confirmation at all.
pub const DOMAIN_UNREACHABLE: i32 = 125;
/// The remote side failed to spawn the command for a reason other than a
/// missing or non-executable program.
pub const SPAWN_FAILED: i32 = 126;
/// The command was not found or not executable, or the transport helper
/// itself could not be started.
pub const NOT_FOUND: i32 = 127;

pub type CliResult<T> = Result<T, CliError>;

/// A failure that terminates the process with a specific exit code.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

/// Wrap an I/O failure with context; the exit code is a generic failure.
pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(1, format!("{context}: {err}"))
}

/// Fold a stream capability failure into a CLI error.
pub fn stream_error(context: &str, err: StreamError) -> CliError {
    match err {
        StreamError::Dup { source, .. }
        | StreamError::Pipe(source)
        | StreamError::Nonblocking(source)
        | StreamError::Io(source) => io_error(context, source),
    }
}

/// Collapse an exit status into the shell convention: the code itself, or
/// `128 + signo` when the process died from a signal.
pub fn status_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        code
    } else if let Some(signal) = status.signal() {
        128 + signal
    } else {
        1
    }
}
