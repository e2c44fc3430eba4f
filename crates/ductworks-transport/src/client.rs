use std::fmt;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::state::DuctState;
use crate::tcp::{TcpAddress, TcpProvider};
use crate::traits::{poll_stream, DuctStream, RawDuct, SocketProvider};
use crate::uds::UdsProvider;

/// Client side of a transport duct: one socket connected to a server duct.
pub struct ClientDuct<P: SocketProvider = UdsProvider> {
    provider: P,
    connect_address: P::Address,
    connection: Option<P::Stream>,
    config: TransportConfig,
    closed: bool,
}

impl ClientDuct<UdsProvider> {
    /// Client duct targeting a Unix domain socket path.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(UdsProvider, path.into())
    }
}

impl ClientDuct<TcpProvider> {
    /// Client duct targeting a TCP host and port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::tcp_address(TcpAddress::new(host, port))
    }

    /// Client duct targeting an already assembled TCP address, such as a
    /// server duct's listener address.
    pub fn tcp_address(address: TcpAddress) -> Self {
        Self::new(TcpProvider, address)
    }
}

impl<P: SocketProvider> ClientDuct<P> {
    pub fn new(provider: P, connect_address: P::Address) -> Self {
        Self {
            provider,
            connect_address,
            connection: None,
            config: TransportConfig::default(),
            closed: false,
        }
    }

    /// Override transport configuration.
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Current transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The address this duct connects to.
    pub fn connect_address(&self) -> &P::Address {
        &self.connect_address
    }

    /// Connect to the server duct. A second call on a connected duct does
    /// nothing.
    pub fn connect(&mut self) -> Result<()> {
        match self.state() {
            DuctState::Connected => {
                debug!(address = ?self.connect_address, "client duct already connected");
                Ok(())
            }
            state @ (DuctState::Closed | DuctState::AwaitingPeer) => {
                Err(TransportError::InvalidState {
                    operation: "connect",
                    state,
                })
            }
            DuctState::Idle => {
                let stream = self
                    .provider
                    .construct_connection(&self.connect_address, self.config.connect_timeout)?;
                stream.set_io_timeout(self.config.io_timeout)?;
                self.connection = Some(stream);
                info!(address = ?self.connect_address, "client duct connected");
                Ok(())
            }
        }
    }

    /// Shut the connection down without releasing it, waking any thread
    /// blocked in a receive. Best effort; the duct must still be closed.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(connection) = &self.connection {
            connection.shutdown()?;
        }
        Ok(())
    }

    fn connection(&self, operation: &'static str) -> Result<&P::Stream> {
        self.connection
            .as_ref()
            .ok_or_else(|| TransportError::InvalidState {
                operation,
                state: self.state(),
            })
    }
}

impl<P: SocketProvider> RawDuct for ClientDuct<P> {
    fn send(&self, buf: &[u8]) -> Result<usize> {
        Ok(self.connection("send")?.send(buf)?)
    }

    fn recv_into(&self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.connection("recv")?.recv_into(buf)?)
    }

    fn poll(&self, timeout: Duration) -> Result<bool> {
        poll_stream(self.connection("poll")?, timeout)
    }

    fn close(&mut self) -> Result<()> {
        let was_closed = std::mem::replace(&mut self.closed, true);
        let result = match self.connection.take() {
            Some(connection) => self.provider.destroy_connection(connection),
            None => Ok(()),
        };
        if !was_closed {
            debug!(address = ?self.connect_address, "client duct closed");
        }
        result
    }

    fn state(&self) -> DuctState {
        if self.closed {
            DuctState::Closed
        } else if self.connection.is_some() {
            DuctState::Connected
        } else {
            DuctState::Idle
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        self.connection.as_ref().map(AsRawFd::as_raw_fd)
    }
}

impl<P: SocketProvider> Drop for ClientDuct<P> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing client duct on drop");
        }
    }
}

impl<P: SocketProvider> fmt::Debug for ClientDuct<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientDuct")
            .field("connect_address", &self.connect_address)
            .field("state", &self.state())
            .finish()
    }
}
