use std::fmt;
use std::marker::PhantomData;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ductworks_transport::{
    ClientDuct, DuctState, RawDuct, ServerDuct, SocketProvider, TcpAddress, TcpProvider,
    UdsProvider,
};

use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::lock::{DuctLock, LockGuard};
use crate::reader::read_frame;
use crate::serialize::{Codec, JsonCodec};
use crate::writer::write_frame;

/// A transport duct that sends and receives whole messages of type `T`.
///
/// Owns its transport duct: closing (or dropping) the message duct closes
/// the transport. Without a lock, concurrent `send` calls (or concurrent
/// `recv` calls) from several threads interleave frames and corrupt the
/// stream; give every thread sharing the duct the same lock via
/// [`with_lock`](Self::with_lock).
pub struct MessageDuct<D, T, C = JsonCodec> {
    duct: D,
    codec: C,
    lock: Option<Arc<dyn DuctLock>>,
    config: FrameConfig,
    _payload: PhantomData<fn(T) -> T>,
}

/// Server-role message duct.
pub type MessageServer<T, P = UdsProvider, C = JsonCodec> = MessageDuct<ServerDuct<P>, T, C>;

/// Client-role message duct.
pub type MessageClient<T, P = UdsProvider, C = JsonCodec> = MessageDuct<ClientDuct<P>, T, C>;

impl<D: RawDuct, T> MessageDuct<D, T, JsonCodec>
where
    JsonCodec: Codec<T>,
{
    /// Wrap `duct`, encoding messages as JSON.
    pub fn new(duct: D) -> Self {
        Self::with_codec(duct, JsonCodec)
    }
}

impl<D: RawDuct, T, C: Codec<T>> MessageDuct<D, T, C> {
    /// Wrap `duct` with an explicit payload codec.
    pub fn with_codec(duct: D, codec: C) -> Self {
        Self {
            duct,
            codec,
            lock: None,
            config: FrameConfig::default(),
            _payload: PhantomData,
        }
    }

    /// Guard every send and receive with `lock`.
    pub fn with_lock(mut self, lock: Arc<dyn DuctLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    /// Override framing configuration.
    pub fn with_frame_config(mut self, config: FrameConfig) -> Self {
        self.config = config;
        self
    }

    /// Serialize `payload` and write it as one frame.
    ///
    /// Either the whole frame is written or an error is returned. After a
    /// failure part-way through the write, the peer's stream is
    /// desynchronized and the duct should be closed.
    pub fn send(&self, payload: &T) -> Result<()> {
        let _guard = LockGuard::acquire(self.lock.as_deref()).map_err(FrameError::Lock)?;
        let bytes = self.codec.serialize(payload).map_err(FrameError::Serialize)?;
        write_frame(&self.duct, &bytes, &self.config)
    }

    /// Block until one whole frame has arrived and deserialize it.
    pub fn recv(&self) -> Result<T> {
        let _guard = LockGuard::acquire(self.lock.as_deref()).map_err(FrameError::Lock)?;
        let bytes = read_frame(&self.duct, &self.config)?;
        self.codec.deserialize(&bytes).map_err(FrameError::Deserialize)
    }

    /// Wait up to `timeout` for incoming data without consuming it.
    pub fn poll(&self, timeout: Duration) -> Result<bool> {
        Ok(self.duct.poll(timeout)?)
    }

    /// Close the underlying transport duct. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        Ok(self.duct.close()?)
    }

    pub fn state(&self) -> DuctState {
        self.duct.state()
    }

    /// Descriptor of the underlying connection, for external readiness loops.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.duct.raw_fd()
    }

    /// Borrow the transport duct. Writing to it directly bypasses framing.
    pub fn get_ref(&self) -> &D {
        &self.duct
    }

    /// Mutably borrow the transport duct.
    pub fn get_mut(&mut self) -> &mut D {
        &mut self.duct
    }

    /// Unwrap into the transport duct, which stays open.
    pub fn into_inner(self) -> D {
        self.duct
    }
}

impl<T> MessageServer<T>
where
    JsonCodec: Codec<T>,
{
    /// JSON server on a Unix domain socket path. An empty path is replaced
    /// by a generated one at bind time.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(ServerDuct::unix(path))
    }

    /// JSON server on a freshly generated socket path.
    pub fn pseudo_anonymous() -> Result<Self> {
        Ok(Self::new(ServerDuct::pseudo_anonymous()?))
    }
}

impl<T> MessageServer<T, TcpProvider>
where
    JsonCodec: Codec<T>,
{
    /// JSON server on a TCP host and port. Port `0` picks an ephemeral port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(ServerDuct::tcp(host, port))
    }
}

impl<T, P: SocketProvider, C: Codec<T>> MessageServer<T, P, C> {
    pub fn bind(&mut self) -> Result<()> {
        Ok(self.duct.bind()?)
    }

    pub fn bind_with_backlog(&mut self, backlog: u32) -> Result<()> {
        Ok(self.duct.bind_with_backlog(backlog)?)
    }

    /// Wait up to `timeout` for the peer. `Ok(false)` means no peer yet.
    pub fn listen(&mut self, timeout: Duration) -> Result<bool> {
        Ok(self.duct.listen(timeout)?)
    }

    pub fn bind_address(&self) -> &P::Address {
        self.duct.bind_address()
    }

    pub fn listener_address(&self) -> Option<&P::Address> {
        self.duct.listener_address()
    }

    /// Wake threads blocked on this duct without releasing its sockets.
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.duct.shutdown()?)
    }
}

impl<T> MessageClient<T>
where
    JsonCodec: Codec<T>,
{
    /// JSON client targeting a Unix domain socket path.
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::new(ClientDuct::unix(path))
    }
}

impl<T> MessageClient<T, TcpProvider>
where
    JsonCodec: Codec<T>,
{
    /// JSON client targeting a TCP host and port.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new(ClientDuct::tcp(host, port))
    }

    pub fn tcp_address(address: TcpAddress) -> Self {
        Self::new(ClientDuct::tcp_address(address))
    }
}

impl<T, P: SocketProvider, C: Codec<T>> MessageClient<T, P, C> {
    pub fn connect(&mut self) -> Result<()> {
        Ok(self.duct.connect()?)
    }

    pub fn connect_address(&self) -> &P::Address {
        self.duct.connect_address()
    }

    /// Wake threads blocked on this duct without releasing its socket.
    pub fn shutdown(&self) -> Result<()> {
        Ok(self.duct.shutdown()?)
    }
}

impl<D: fmt::Debug, T, C> fmt::Debug for MessageDuct<D, T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageDuct")
            .field("duct", &self.duct)
            .field("locked", &self.lock.is_some())
            .field("config", &self.config)
            .finish()
    }
}
