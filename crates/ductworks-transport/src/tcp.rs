use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Operation, Result, TransportError};
use crate::sys;
use crate::traits::{DuctListener, DuctStream, SocketProvider};

/// A TCP endpoint as a host name (or literal IP) and a port.
///
/// Port `0` asks the OS for an ephemeral port when binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TcpAddress {
    pub host: String,
    pub port: u16,
}

impl TcpAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `localhost` with an OS-assigned port.
    pub fn ephemeral() -> Self {
        Self::new("localhost", 0)
    }

    fn resolve(&self) -> std::io::Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port).to_socket_addrs()?.collect();
        if addrs.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{} did not resolve to any address", self.host),
            ));
        }
        Ok(addrs)
    }
}

impl From<SocketAddr> for TcpAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for TcpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// TCP provider. Listeners have `SO_REUSEADDR` set (std does this on Unix).
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProvider;

impl DuctListener for TcpListener {
    type Stream = TcpStream;

    fn accept(&self) -> std::io::Result<TcpStream> {
        let (stream, _addr) = TcpListener::accept(self)?;
        Ok(stream)
    }
}

impl DuctStream for TcpStream {
    fn send(&self, buf: &[u8]) -> std::io::Result<usize> {
        let mut stream: &TcpStream = self;
        stream.write(buf)
    }

    fn recv_into(&self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut stream: &TcpStream = self;
        stream.read(buf)
    }

    fn shutdown(&self) -> std::io::Result<()> {
        sys::ignore_not_connected(TcpStream::shutdown(self, Shutdown::Both))
    }

    fn set_io_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        self.set_read_timeout(timeout)?;
        self.set_write_timeout(timeout)
    }
}

impl SocketProvider for TcpProvider {
    type Address = TcpAddress;
    type Stream = TcpStream;
    type Listener = TcpListener;

    fn construct_listener(&self, address: &TcpAddress, backlog: u32) -> Result<TcpListener> {
        let fault = |e| TransportError::fault(Operation::Bind, address, e);
        let addrs = address.resolve().map_err(fault)?;
        let listener = TcpListener::bind(addrs.as_slice()).map_err(fault)?;
        sys::set_backlog(listener.as_raw_fd(), backlog).map_err(fault)?;

        info!(
            requested = %address,
            local = ?listener.local_addr().ok(),
            backlog,
            "listening on tcp"
        );
        Ok(listener)
    }

    fn listener_address(&self, listener: &TcpListener) -> Result<TcpAddress> {
        Ok(listener.local_addr()?.into())
    }

    fn construct_connection(
        &self,
        address: &TcpAddress,
        timeout: Option<Duration>,
    ) -> Result<TcpStream> {
        let fault = |e| TransportError::fault(Operation::Connect, address, e);
        let addrs = address.resolve().map_err(fault)?;

        let mut last_err = None;
        for addr in addrs {
            let attempt = match timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    debug!(%address, %addr, "connected over tcp");
                    return Ok(stream);
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(fault(last_err.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "no address to connect to")
        })))
    }

    fn destroy_listener(&self, listener: TcpListener) -> Result<()> {
        sys::shutdown_both(listener.as_raw_fd())?;
        drop(listener);
        Ok(())
    }

    fn destroy_connection(&self, stream: TcpStream) -> Result<()> {
        DuctStream::shutdown(&stream)?;
        Ok(())
    }
}
