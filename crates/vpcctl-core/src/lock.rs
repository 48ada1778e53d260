//! Advisory locking around control-plane operations.
//!
//! One flock-backed lock file per VPC plus a store-wide lock. Single-VPC
//! verbs hold the store lock *shared* and their VPC lock *exclusive*;
//! verbs that touch several VPCs (`peer`, `apply-policy`, `delete-vpc`,
//! `teardown-all`) hold the store lock *exclusive*. Acquisition polls
//! non-blocking until the deadline so a wedged peer invocation surfaces
//! as `busy` instead of hanging forever.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::{Error, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Multiple holders; excludes exclusive holders.
    Shared,
    /// Single holder.
    Exclusive,
}

/// A held advisory lock. Dropping it releases the flock.
pub struct OpLock {
    _flock: Flock<File>,
}

impl std::fmt::Debug for OpLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpLock").finish()
    }
}

/// Acquires a lock on `path`, creating the file if needed, waiting at
/// most `timeout`.
pub fn acquire(path: &Path, mode: LockMode, timeout: Duration) -> Result<OpLock> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Validation(format!(
                "cannot create lock directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    let arg = match mode {
        LockMode::Shared => FlockArg::LockSharedNonblock,
        LockMode::Exclusive => FlockArg::LockExclusiveNonblock,
    };

    let deadline = Instant::now() + timeout;
    loop {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                Error::Validation(format!("cannot open lock file {}: {e}", path.display()))
            })?;

        match Flock::lock(file, arg) {
            Ok(flock) => {
                debug!(path = %path.display(), ?mode, "lock acquired");
                return Ok(OpLock { _flock: flock });
            }
            Err((_, Errno::EWOULDBLOCK | Errno::EAGAIN)) => {
                if Instant::now() >= deadline {
                    return Err(Error::Busy(format!(
                        "could not acquire {} within {:?}",
                        path.display(),
                        timeout
                    )));
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err((_, errno)) => {
                return Err(Error::Validation(format!(
                    "flock {} failed: {errno}",
                    path.display()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_and_release() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("alpha.lock");

        let lock = acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();
        drop(lock);

        // reacquirable after release
        let _again = acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn test_exclusive_contention_times_out_as_busy() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("alpha.lock");

        let _held = acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();
        let err = acquire(&path, LockMode::Exclusive, Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, Error::Busy(_)), "{err}");
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_shared_holders_coexist_but_block_exclusive() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(".global.lock");

        let _a = acquire(&path, LockMode::Shared, Duration::from_secs(1)).unwrap();
        let _b = acquire(&path, LockMode::Shared, Duration::from_secs(1)).unwrap();

        let err = acquire(&path, LockMode::Exclusive, Duration::from_millis(250)).unwrap_err();
        assert!(matches!(err, Error::Busy(_)));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state").join(".global.lock");

        let _lock = acquire(&path, LockMode::Exclusive, Duration::from_secs(1)).unwrap();
        assert!(path.exists());
    }
}
