use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;

use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

/// Environment override for the lock file path.
pub const LOCK_PATH_ENV: &str = "BOMBSHELL_LOCK";

const LOCK_FILE_NAME: &str = ".bombshell-lock";

/// Exclusive per-user lock held for the duration of the launch handshake.
///
/// Serializes handshakes on the local host, so two invocations never
/// interleave their bootstrap traffic on the way to the same domain. The
/// file is created readable and writable by the owner only. Released when
/// dropped.
pub struct HandshakeLock {
    _guard: Flock<std::fs::File>,
}

impl HandshakeLock {
    /// Acquire the lock at the default path, blocking until it is free.
    pub fn acquire() -> io::Result<Self> {
        Self::acquire_at(default_path()?)
    }

    /// Acquire the lock at an explicit path, blocking until it is free.
    pub fn acquire_at(path: PathBuf) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .mode(0o600)
            .open(&path)?;

        debug!(?path, "waiting for handshake lock");
        let guard =
            Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| io::Error::from(errno))?;
        debug!(?path, "handshake lock held");

        Ok(Self { _guard: guard })
    }
}

fn default_path() -> io::Result<PathBuf> {
    if let Some(path) = std::env::var_os(LOCK_PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var_os("HOME")
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "HOME is not set"))?;
    Ok(PathBuf::from(home).join(LOCK_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn lock_file_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handshake.lock");

        let lock = HandshakeLock::acquire_at(path.clone()).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        drop(lock);
    }

    #[test]
    fn lock_excludes_a_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handshake.lock");

        let lock = HandshakeLock::acquire_at(path.clone()).unwrap();

        let probe = File::options()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let contended = Flock::lock(probe, FlockArg::LockExclusiveNonblock);
        assert!(contended.is_err());

        drop(lock);
        let probe = File::options().read(true).write(true).open(&path).unwrap();
        let released = Flock::lock(probe, FlockArg::LockExclusiveNonblock);
        assert!(released.is_ok());
    }

    #[test]
    fn lock_can_be_reacquired_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("handshake.lock");

        drop(HandshakeLock::acquire_at(path.clone()).unwrap());
        drop(HandshakeLock::acquire_at(path).unwrap());
    }
}
