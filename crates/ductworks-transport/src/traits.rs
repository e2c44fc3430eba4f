use std::fmt::Debug;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::Result;
use crate::state::DuctState;
use crate::sys::{self, PollTarget, Readiness};

/// A connected byte-stream socket.
///
/// All operations take `&self` so that one connection can be shared by
/// several threads; coordinating them is the framing layer's job.
pub trait DuctStream: AsRawFd + Send + Sync {
    /// Write as many bytes of `buf` as the socket accepts in one call.
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    /// Read into `buf` once. `Ok(0)` means the peer closed its side.
    fn recv_into(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Shut down both directions. A socket that is already disconnected is
    /// not an error.
    fn shutdown(&self) -> io::Result<()>;

    /// Apply a read and write timeout. `None` restores plain blocking I/O.
    fn set_io_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

/// A bound, listening socket.
pub trait DuctListener: AsRawFd + Send + Sync {
    type Stream: DuctStream;

    /// Accept one pending connection (blocking).
    fn accept(&self) -> io::Result<Self::Stream>;
}

/// Constructs and destroys the sockets behind a duct.
///
/// A new transport is added by implementing this contract; the ducts
/// themselves never need to change.
pub trait SocketProvider: Send + Sync {
    type Address: Clone + Debug + Send + Sync;
    type Stream: DuctStream;
    type Listener: DuctListener<Stream = Self::Stream>;

    /// Create a socket, bind it to `address` and start listening with `backlog`.
    fn construct_listener(&self, address: &Self::Address, backlog: u32)
        -> Result<Self::Listener>;

    /// The address `listener` actually listens on.
    fn listener_address(&self, listener: &Self::Listener) -> Result<Self::Address>;

    /// Create a socket and connect it to `address`.
    fn construct_connection(
        &self,
        address: &Self::Address,
        timeout: Option<Duration>,
    ) -> Result<Self::Stream>;

    /// Shut down and close a listener, releasing any address it owns.
    fn destroy_listener(&self, listener: Self::Listener) -> Result<()>;

    /// Shut down and close a connection.
    fn destroy_connection(&self, stream: Self::Stream) -> Result<()>;
}

/// The raw, non-looping contract shared by both duct roles.
///
/// `send` and `recv_into` report however many bytes one underlying call
/// moved; reassembly belongs to the framing layer.
pub trait RawDuct: Send + Sync {
    /// Write once to the connection.
    fn send(&self, buf: &[u8]) -> Result<usize>;

    /// Read once from the connection into `buf`.
    fn recv_into(&self, buf: &mut [u8]) -> Result<usize>;

    /// Read once, at most `max` bytes. An empty result is the EOF signal.
    fn recv(&self, max: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max);
        let read = self.recv_into(&mut buf)?;
        buf.truncate(read);
        Ok(buf.freeze())
    }

    /// Wait up to `timeout` for the connection to become readable, without
    /// consuming anything.
    fn poll(&self, timeout: Duration) -> Result<bool>;

    /// Release every socket the duct holds. Safe to call repeatedly.
    fn close(&mut self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> DuctState;

    /// Descriptor of the connection, for external readiness loops.
    fn raw_fd(&self) -> Option<RawFd>;
}

/// Readiness check shared by both duct roles.
pub(crate) fn poll_stream<S: DuctStream>(stream: &S, timeout: Duration) -> Result<bool> {
    let ready = sys::wait_readable(stream.as_raw_fd(), timeout, PollTarget::Connection)?;
    Ok(ready == Readiness::Readable)
}
