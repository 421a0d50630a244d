use crate::error::{Result, StreamError};
use crate::fd::FdStream;

/// Create an anonymous pipe, read end first.
///
/// Used for the in-process signal channel: one end feeds the relay, the
/// other belongs to the signal worker.
pub fn pipe_pair() -> Result<(FdStream, FdStream)> {
    let (read_end, write_end) =
        nix::unistd::pipe().map_err(|errno| StreamError::Pipe(errno.into()))?;
    Ok((
        FdStream::from_owned(read_end),
        FdStream::from_owned(write_end),
    ))
}
