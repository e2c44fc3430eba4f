use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Operation, Result, TransportError};
use crate::sys;
use crate::traits::{DuctListener, DuctStream, SocketProvider};

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Generate a fresh, unused socket path in the temp directory.
///
/// The name comes from a temporary file that is created and immediately
/// removed, so the path is unique at the time of the call.
pub fn anonymous_socket_path() -> std::io::Result<PathBuf> {
    let file = tempfile::Builder::new()
        .prefix("ductworks-")
        .suffix(".sock")
        .tempfile()?;
    let path = file.path().to_path_buf();
    file.close()?;
    Ok(path)
}

/// Unix domain socket provider. Addresses are filesystem paths; an empty
/// path asks for a pseudo-anonymous one.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdsProvider;

/// A listening Unix domain socket that owns its filesystem path.
///
/// Dropping it removes the socket file, but only if the path still refers
/// to the socket this listener created.
#[derive(Debug)]
pub struct UdsListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UdsListener {
    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsRawFd for UdsListener {
    fn as_raw_fd(&self) -> RawFd {
        self.listener.as_raw_fd()
    }
}

impl DuctListener for UdsListener {
    type Stream = UnixStream;

    fn accept(&self) -> std::io::Result<UnixStream> {
        let (stream, _addr) = self.listener.accept()?;
        Ok(stream)
    }
}

impl Drop for UdsListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "unlinking socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path identity changed; skipping unlink");
            }
        }
    }
}

impl DuctStream for UnixStream {
    fn send(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut stream: &UnixStream = self;
        stream.write(buf)
    }

    fn recv_into(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut stream: &UnixStream = self;
        stream.read(buf)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        sys::ignore_not_connected(UnixStream::shutdown(self, Shutdown::Both))
    }

    fn set_io_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

impl UdsProvider {
    fn prepare_path(path: &Path) -> Result<PathBuf> {
        let path = if path.as_os_str().is_empty() {
            anonymous_socket_path().map_err(|e| TransportError::fault(Operation::Bind, path, e))?
        } else {
            path.to_path_buf()
        };

        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }

        // Remove a stale socket, but never a file that is not a socket.
        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(TransportError::fault(
                    Operation::Bind,
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            // A socket someone still listens on is in use, not stale.
            match UnixStream::connect(&path) {
                Ok(_) => {
                    return Err(TransportError::fault(
                        Operation::Bind,
                        &path,
                        std::io::Error::new(
                            std::io::ErrorKind::AddrInUse,
                            "socket path is in use by a live listener",
                        ),
                    ));
                }
                Err(err) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                    debug!(?path, "removing stale socket");
                    std::fs::remove_file(&path)
                        .map_err(|e| TransportError::fault(Operation::Bind, &path, e))?;
                }
                Err(err) => return Err(TransportError::fault(Operation::Bind, &path, err)),
            }
        }

        Ok(path)
    }
}

impl SocketProvider for UdsProvider {
    type Address = PathBuf;
    type Stream = UnixStream;
    type Listener = UdsListener;

    fn construct_listener(&self, address: &PathBuf, backlog: u32) -> Result<UdsListener> {
        let path = Self::prepare_path(address)?;
        let fault = |e| TransportError::fault(Operation::Bind, &path, e);

        let listener = UnixListener::bind(&path).map_err(fault)?;
        let created = std::fs::symlink_metadata(&path).map_err(fault)?;
        let listener = UdsListener {
            listener,
            created_inode: Some((created.dev(), created.ino())),
            path,
        };
        sys::set_backlog(listener.as_raw_fd(), backlog)
            .map_err(|e| TransportError::fault(Operation::Bind, &listener.path, e))?;

        info!(path = ?listener.path, backlog, "listening on unix domain socket");
        Ok(listener)
    }

    fn listener_address(&self, listener: &UdsListener) -> Result<PathBuf> {
        Ok(listener.path.clone())
    }

    fn construct_connection(
        &self,
        address: &PathBuf,
        _timeout: Option<Duration>,
    ) -> Result<UnixStream> {
        let stream = UnixStream::connect(address)
            .map_err(|e| TransportError::fault(Operation::Connect, address, e))?;
        debug!(path = ?address, "connected to unix domain socket");
        Ok(stream)
    }

    fn destroy_listener(&self, listener: UdsListener) -> Result<()> {
        sys::shutdown_both(listener.as_raw_fd())?;
        drop(listener);
        Ok(())
    }

    fn destroy_connection(&self, stream: UnixStream) -> Result<()> {
        DuctStream::shutdown(&stream)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_paths_are_unique_and_absent() {
        let first = anonymous_socket_path().unwrap();
        let second = anonymous_socket_path().unwrap();
        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(!second.exists());
    }

    #[test]
    fn empty_path_binds_anonymous_socket() {
        let listener = UdsProvider.construct_listener(&PathBuf::new(), 1).unwrap();
        let path = UdsProvider.listener_address(&listener).unwrap();
        assert!(!path.as_os_str().is_empty());
        assert!(path.exists());

        UdsProvider.destroy_listener(listener).unwrap();
        assert!(!path.exists(), "socket file should be unlinked on destroy");
    }

    #[test]
    fn path_too_long() {
        let long_path = PathBuf::from("/tmp/".to_string() + &"a".repeat(200) + ".sock");
        let result = UdsProvider.construct_listener(&long_path, 1);
        assert!(matches!(result, Err(TransportError::PathTooLong { .. })));
    }

    #[test]
    fn replaces_stale_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("stale.sock");

        let stale = UnixListener::bind(&sock_path).unwrap();
        drop(stale);
        assert!(sock_path.exists());

        let listener = UdsProvider.construct_listener(&sock_path, 1).unwrap();
        UdsProvider.destroy_listener(listener).unwrap();
        assert!(!sock_path.exists());
    }

    #[test]
    fn refuses_to_take_over_live_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("live.sock");

        let first = UdsProvider.construct_listener(&sock_path, 1).unwrap();
        let err = UdsProvider.construct_listener(&sock_path, 1).unwrap_err();
        assert!(matches!(
            err,
            TransportError::CommunicationFault {
                operation: Operation::Bind,
                ref source,
                ..
            } if source.kind() == std::io::ErrorKind::AddrInUse
        ));
        assert!(sock_path.exists(), "live socket must be left in place");

        // The liveness check itself queued one connection on the first listener.
        let client = UdsProvider.construct_connection(&sock_path, None).unwrap();
        DuctListener::accept(&first).expect("liveness check connection");
        DuctListener::accept(&first).expect("first listener still reachable");
        UdsProvider.destroy_connection(client).unwrap();
        UdsProvider.destroy_listener(first).unwrap();
    }

    #[test]
    fn rejects_existing_non_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("not-a-socket.sock");
        std::fs::write(&sock_path, b"regular-file").unwrap();

        let err = UdsProvider.construct_listener(&sock_path, 1).unwrap_err();
        assert!(err.is_communication_fault());
        assert!(sock_path.exists());
    }

    #[test]
    fn destroy_does_not_remove_replaced_path() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("replaced.sock");

        let listener = UdsProvider.construct_listener(&sock_path, 1).unwrap();
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        UdsProvider.destroy_listener(listener).unwrap();
        assert!(
            sock_path.exists(),
            "destroy must not remove path if inode identity changed"
        );
    }

    #[test]
    fn connect_to_missing_path_is_a_fault() {
        let dir = tempfile::tempdir().unwrap();
        let err = UdsProvider
            .construct_connection(&dir.path().join("nobody.sock"), None)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::CommunicationFault {
                operation: Operation::Connect,
                ..
            }
        ));
    }

    #[test]
    fn stream_send_and_recv_by_reference() {
        let (left, right) = UnixStream::pair().unwrap();
        assert_eq!(DuctStream::send(&left, b"hello").unwrap(), 5);

        let mut buf = [0u8; 5];
        let mut filled = 0;
        while filled < buf.len() {
            filled += right.recv_into(&mut buf[filled..]).unwrap();
        }
        assert_eq!(&buf, b"hello");

        DuctStream::shutdown(&left).unwrap();
        assert_eq!(right.recv_into(&mut buf).unwrap(), 0);
    }
}
