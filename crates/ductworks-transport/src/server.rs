use std::fmt;
use std::io::ErrorKind;
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::TransportConfig;
use crate::error::{Operation, Result, TransportError};
use crate::state::DuctState;
use crate::sys::{self, PollTarget, Readiness};
use crate::tcp::{TcpAddress, TcpProvider};
use crate::traits::{poll_stream, DuctListener, DuctStream, RawDuct, SocketProvider};
use crate::uds::{anonymous_socket_path, UdsProvider};

/// Server side of a transport duct.
///
/// Owns a listener until the first peer is accepted, then only that peer's
/// connection. The listener is single-use: it is released as soon as one
/// connection has been accepted.
pub struct ServerDuct<P: SocketProvider = UdsProvider> {
    provider: P,
    bind_address: P::Address,
    listener_address: Option<P::Address>,
    listener: Option<P::Listener>,
    connection: Option<P::Stream>,
    config: TransportConfig,
    closed: bool,
}

impl ServerDuct<UdsProvider> {
    /// Server duct on a Unix domain socket path. An empty path is replaced
    /// by a generated one at bind time.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(UdsProvider, path.into())
    }

    /// Server duct on a freshly generated socket path.
    pub fn pseudo_anonymous() -> Result<Self> {
        Ok(Self::unix(anonymous_socket_path()?))
    }
}

impl ServerDuct<TcpProvider> {
    /// Server duct on a TCP host and port. Port `0` picks an ephemeral port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(TcpProvider, TcpAddress::new(host, port))
    }
}

impl<P: SocketProvider> ServerDuct<P> {
    /// Create an idle server duct. Nothing is bound until [`bind`](Self::bind)
    /// or [`listen`](Self::listen).
    pub fn new(provider: P, bind_address: P::Address) -> Self {
        Self {
            provider,
            bind_address,
            listener_address: None,
            listener: None,
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

    /// The address requested at construction.
    pub fn bind_address(&self) -> &P::Address {
        &self.bind_address
    }

    /// The address the listener is (or was) actually bound to.
    ///
    /// Differs from [`bind_address`](Self::bind_address) when a placeholder
    /// was requested. `None` until the first successful bind.
    pub fn listener_address(&self) -> Option<&P::Address> {
        self.listener_address.as_ref()
    }

    /// Bind with the configured backlog. Idempotent while awaiting a peer.
    pub fn bind(&mut self) -> Result<()> {
        self.bind_with_backlog(self.config.backlog)
    }

    /// Bind with an explicit backlog. Idempotent while awaiting a peer.
    pub fn bind_with_backlog(&mut self, backlog: u32) -> Result<()> {
        match self.state() {
            DuctState::AwaitingPeer => Ok(()),
            state @ (DuctState::Connected | DuctState::Closed) => {
                Err(TransportError::InvalidState {
                    operation: "bind",
                    state,
                })
            }
            DuctState::Idle => {
                let listener = self.provider.construct_listener(&self.bind_address, backlog)?;
                self.listener_address = Some(self.provider.listener_address(&listener)?);
                self.listener = Some(listener);
                Ok(())
            }
        }
    }

    /// Wait up to `timeout` for a peer and accept it.
    ///
    /// Binds first if needed. Returns `Ok(false)` when the timeout elapses
    /// with no peer, leaving the duct untouched so the call can be retried.
    /// Returns `Ok(true)` immediately when already connected.
    pub fn listen(&mut self, timeout: Duration) -> Result<bool> {
        match self.state() {
            DuctState::Connected => return Ok(true),
            state @ DuctState::Closed => {
                return Err(TransportError::InvalidState {
                    operation: "listen",
                    state,
                })
            }
            DuctState::Idle => self.bind()?,
            DuctState::AwaitingPeer => {}
        }

        let Some(listener) = self.listener.as_ref() else {
            return Err(TransportError::InvalidState {
                operation: "listen",
                state: self.state(),
            });
        };
        let fd = listener.as_raw_fd();

        let readiness = sys::wait_readable(fd, timeout, PollTarget::Listener)
            .map_err(|e| TransportError::fault(Operation::Listen, &self.bind_address, e))?;

        match readiness {
            Readiness::TimedOut => Ok(false),
            Readiness::Faulted => {
                let source = sys::take_socket_error(fd).unwrap_or_else(|| {
                    std::io::Error::other("listener socket reported an exceptional condition")
                });
                if let Some(listener) = self.listener.take() {
                    if let Err(err) = self.provider.destroy_listener(listener) {
                        warn!(error = %err, "failed releasing faulted listener");
                    }
                }
                Err(TransportError::fault(
                    Operation::Listen,
                    &self.bind_address,
                    source,
                ))
            }
            Readiness::Readable => {
                let stream = loop {
                    match listener.accept() {
                        Ok(stream) => break stream,
                        Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                        Err(err) => {
                            return Err(TransportError::fault(
                                Operation::Accept,
                                &self.bind_address,
                                err,
                            ))
                        }
                    }
                };
                stream.set_io_timeout(self.config.io_timeout)?;
                debug!(address = ?self.listener_address, "accepted connection");

                self.connection = Some(stream);
                if let Some(listener) = self.listener.take() {
                    self.provider.destroy_listener(listener)?;
                }
                info!(address = ?self.listener_address, "server duct connected");
                Ok(true)
            }
        }
    }

    /// Shut the sockets down without releasing them.
    ///
    /// Another thread blocked in a receive on this duct is woken up (it
    /// observes EOF or an error). Best effort; the duct must still be closed.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(connection) = &self.connection {
            connection.shutdown()?;
        }
        if let Some(listener) = &self.listener {
            sys::shutdown_both(listener.as_raw_fd())?;
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

impl<P: SocketProvider> RawDuct for ServerDuct<P> {
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

        let listener_result = match self.listener.take() {
            Some(listener) => self.provider.destroy_listener(listener),
            None => Ok(()),
        };
        let connection_result = match self.connection.take() {
            Some(connection) => self.provider.destroy_connection(connection),
            None => Ok(()),
        };

        if !was_closed {
            debug!(address = ?self.listener_address, "server duct closed");
        }
        listener_result.and(connection_result)
    }

    fn state(&self) -> DuctState {
        if self.closed {
            DuctState::Closed
        } else if self.connection.is_some() {
            DuctState::Connected
        } else if self.listener.is_some() {
            DuctState::AwaitingPeer
        } else {
            DuctState::Idle
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        match (&self.connection, &self.listener) {
            (Some(connection), _) => Some(connection.as_raw_fd()),
            (None, Some(listener)) => Some(listener.as_raw_fd()),
            (None, None) => None,
        }
    }
}

impl<P: SocketProvider> Drop for ServerDuct<P> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "error closing server duct on drop");
        }
    }
}

impl<P: SocketProvider> fmt::Debug for ServerDuct<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDuct")
            .field("bind_address", &self.bind_address)
            .field("listener_address", &self.listener_address)
            .field("state", &self.state())
            .finish()
    }
}
