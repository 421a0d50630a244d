use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};

use crate::error::{Result, StreamError};

/// An owned file descriptor usable as a relay source or sink.
///
/// Dropping an `FdStream` closes the descriptor, which is how end-of-stream
/// reaches whoever holds the other end. The stdio constructors duplicate
/// the process descriptors, so the relay can close its copy without
/// touching the caller's.
#[derive(Debug)]
pub struct FdStream {
    inner: File,
}

impl FdStream {
    /// Wrap an owned descriptor.
    pub fn from_owned(fd: OwnedFd) -> Self {
        Self {
            inner: File::from(fd),
        }
    }

    /// Duplicate of the process's stdin.
    pub fn stdin() -> Result<Self> {
        Self::dup_stdio("stdin", io::stdin().as_fd())
    }

    /// Duplicate of the process's stdout.
    pub fn stdout() -> Result<Self> {
        Self::dup_stdio("stdout", io::stdout().as_fd())
    }

    /// Duplicate of the process's stderr as it is right now.
    ///
    /// Taken early, this pins the original destination even if fd 2 is
    /// later redirected.
    pub fn stderr() -> Result<Self> {
        Self::dup_stdio("stderr", io::stderr().as_fd())
    }

    /// Duplicate this stream onto a new descriptor.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
        })
    }

    fn dup_stdio(name: &'static str, fd: BorrowedFd<'_>) -> Result<Self> {
        let owned = fd
            .try_clone_to_owned()
            .map_err(|source| StreamError::Dup { name, source })?;
        Ok(Self::from_owned(owned))
    }
}

impl Read for FdStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for FdStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl AsFd for FdStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

/// Switch a descriptor in or out of non-blocking mode.
pub fn set_nonblocking(fd: BorrowedFd<'_>, nonblocking: bool) -> Result<()> {
    let bits = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|errno| StreamError::Nonblocking(errno.into()))?;
    let mut flags = OFlag::from_bits_retain(bits);
    flags.set(OFlag::O_NONBLOCK, nonblocking);
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|errno| StreamError::Nonblocking(errno.into()))?;
    Ok(())
}
