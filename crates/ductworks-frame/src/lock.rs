//! Mutual exclusion for ducts shared by several writers or readers.
//!
//! A message duct holds at most one lock and takes it around each whole
//! send or receive, so frames from concurrent callers never interleave.
//! A duct without a lock is unsynchronized: concurrent sends (or concurrent
//! receives) on it corrupt the stream.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};

use tracing::warn;

/// An acquire/release lock. Not reentrant.
pub trait DuctLock: Send + Sync {
    /// Block until the lock is held by the caller.
    fn acquire(&self) -> io::Result<()>;

    /// Release a lock previously acquired by the caller.
    fn release(&self);
}

/// In-process lock with explicit acquire and release.
#[derive(Debug, Default)]
pub struct ThreadLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl ThreadLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DuctLock for ThreadLock {
    fn acquire(&self) -> io::Result<()> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
        Ok(())
    }

    fn release(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        *held = false;
        drop(held);
        self.released.notify_one();
    }
}

/// Cross-process lock over `flock(2)` on a lock file.
///
/// flock locks belong to the open file, so threads sharing one `FileLock`
/// would not exclude each other through flock alone; an inner
/// [`ThreadLock`] covers that case.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
    local: ThreadLock,
}

impl FileLock {
    /// Open (creating if needed) the lock file at `path`.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        Ok(Self {
            file,
            path,
            local: ThreadLock::new(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flock(&self, operation: libc::c_int) -> io::Result<()> {
        loop {
            // SAFETY: the descriptor belongs to `self.file`, which is open for
            // the lifetime of `self`.
            let rc = unsafe { libc::flock(self.file.as_raw_fd(), operation) };
            if rc == 0 {
                return Ok(());
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl DuctLock for FileLock {
    fn acquire(&self) -> io::Result<()> {
        self.local.acquire()?;
        if let Err(err) = self.flock(libc::LOCK_EX) {
            self.local.release();
            return Err(err);
        }
        Ok(())
    }

    fn release(&self) {
        if let Err(err) = self.flock(libc::LOCK_UN) {
            warn!(path = ?self.path, error = %err, "failed releasing file lock");
        }
        self.local.release();
    }
}

/// Holds an optional lock for one scope and releases it on every exit path.
pub(crate) struct LockGuard<'a> {
    lock: Option<&'a dyn DuctLock>,
}

impl<'a> LockGuard<'a> {
    pub(crate) fn acquire(lock: Option<&'a dyn DuctLock>) -> io::Result<Self> {
        if let Some(lock) = lock {
            lock.acquire()?;
        }
        Ok(Self { lock })
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock {
            lock.release();
        }
    }
}
