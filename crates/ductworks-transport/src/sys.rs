//! Thin libc wrappers for the few socket calls std does not expose.

use std::io;
use std::os::fd::RawFd;
use std::time::{Duration, Instant};

/// Outcome of a readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Readable,
    Faulted,
    TimedOut,
}

/// Which conditions count as a fault rather than readability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PollTarget {
    /// Error, invalid descriptor or exceptional data are faults.
    Listener,
    /// Hang-up and error are reported as readable; the next read surfaces
    /// them as EOF or as an error.
    Connection,
}

/// Wait up to `timeout` for `fd` to become readable.
pub(crate) fn wait_readable(
    fd: RawFd,
    timeout: Duration,
    target: PollTarget,
) -> io::Result<Readiness> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        let remaining = deadline.map_or(timeout, |d| d.saturating_duration_since(Instant::now()));
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN | libc::POLLPRI,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid, writable pollfd and we pass a count of one.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_millis(remaining)) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(Readiness::TimedOut);
        }

        let revents = pfd.revents;
        return Ok(match target {
            PollTarget::Listener => {
                let faults = libc::POLLERR | libc::POLLNVAL | libc::POLLPRI | libc::POLLHUP;
                if revents & faults != 0 {
                    Readiness::Faulted
                } else {
                    Readiness::Readable
                }
            }
            PollTarget::Connection => Readiness::Readable,
        });
    }
}

/// Milliseconds for poll(2), rounding sub-millisecond remainders up so a
/// short timeout never degrades into a busy loop.
fn timeout_millis(timeout: Duration) -> libc::c_int {
    let mut millis = timeout.as_millis();
    if timeout.subsec_nanos() % 1_000_000 != 0 {
        millis += 1;
    }
    libc::c_int::try_from(millis).unwrap_or(libc::c_int::MAX)
}

/// Re-issue listen(2) to apply `backlog` to an already listening socket.
pub(crate) fn set_backlog(fd: RawFd, backlog: u32) -> io::Result<()> {
    let backlog = libc::c_int::try_from(backlog).unwrap_or(libc::c_int::MAX);
    // SAFETY: `fd` is an open socket owned by the caller.
    let rc = unsafe { libc::listen(fd, backlog) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// shutdown(2) both directions on a raw descriptor.
pub(crate) fn shutdown_both(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` is an open socket owned by the caller.
    let rc = unsafe { libc::shutdown(fd, libc::SHUT_RDWR) };
    if rc < 0 {
        return ignore_not_connected(Err(io::Error::last_os_error()));
    }
    Ok(())
}

/// Treat `ENOTCONN` from shutdown as "already shut down".
pub(crate) fn ignore_not_connected(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(err) if err.raw_os_error() == Some(libc::ENOTCONN) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
        other => other,
    }
}

/// Fetch and clear the pending socket error (`SO_ERROR`), if any.
pub(crate) fn take_socket_error(fd: RawFd) -> Option<io::Error> {
    let mut code: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

    // SAFETY: `code` and `len` are valid writable pointers for the provided sizes,
    // and `fd` is an open socket descriptor owned by this process.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            (&mut code as *mut libc::c_int).cast::<libc::c_void>(),
            &mut len,
        )
    };

    if rc == 0 && code != 0 {
        Some(io::Error::from_raw_os_error(code))
    } else {
        None
    }
}
