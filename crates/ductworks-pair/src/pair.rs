use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ductworks_frame::{
    Codec, DuctLock, FrameConfig, JsonCodec, MessageClient, MessageDuct, MessageServer,
};
use ductworks_transport::{
    ClientDuct, RawDuct, ServerDuct, SocketProvider, TcpAddress, TcpProvider, TransportConfig,
    TransportError, UdsProvider, DEFAULT_LISTEN_TIMEOUT,
};
use tracing::{debug, info};

use crate::error::{PairError, Result};

/// Configuration for assembling a pair.
#[derive(Clone)]
pub struct PairConfig {
    /// How long the server waits for the client's connection.
    /// Default: [`DEFAULT_LISTEN_TIMEOUT`].
    pub listen_timeout: Duration,
    /// Applied to both transport ducts.
    pub transport: TransportConfig,
    /// Applied to both message ducts.
    pub frame: FrameConfig,
    /// Lock for the server end.
    pub server_lock: Option<Arc<dyn DuctLock>>,
    /// Lock for the client end.
    pub client_lock: Option<Arc<dyn DuctLock>>,
}

impl Default for PairConfig {
    fn default() -> Self {
        Self {
            listen_timeout: DEFAULT_LISTEN_TIMEOUT,
            transport: TransportConfig::default(),
            frame: FrameConfig::default(),
            server_lock: None,
            client_lock: None,
        }
    }
}

impl fmt::Debug for PairConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairConfig")
            .field("listen_timeout", &self.listen_timeout)
            .field("transport", &self.transport)
            .field("frame", &self.frame)
            .field("server_lock", &self.server_lock.is_some())
            .field("client_lock", &self.client_lock.is_some())
            .finish()
    }
}

/// A connected JSON pair over a pseudo-anonymous Unix domain socket.
pub fn duct_pair<T>() -> Result<(MessageServer<T>, MessageClient<T>)>
where
    JsonCodec: Codec<T>,
{
    duct_pair_with(PathBuf::new(), JsonCodec, PairConfig::default())
}

/// A connected pair over a Unix domain socket at `path`. An empty path
/// requests a generated one.
pub fn duct_pair_with<T, C>(
    path: impl Into<PathBuf>,
    codec: C,
    config: PairConfig,
) -> Result<(MessageServer<T, UdsProvider, C>, MessageClient<T, UdsProvider, C>)>
where
    C: Codec<T> + Clone,
{
    duct_pair_with_provider(UdsProvider, path.into(), codec, config)
}

/// A connected pair over TCP on `host`, using an ephemeral port.
pub fn tcp_duct_pair<T, C>(
    host: impl Into<String>,
    codec: C,
    config: PairConfig,
) -> Result<(MessageServer<T, TcpProvider, C>, MessageClient<T, TcpProvider, C>)>
where
    C: Codec<T> + Clone,
{
    duct_pair_with_provider(TcpProvider, TcpAddress::new(host, 0), codec, config)
}

/// A connected pair on any socket provider.
///
/// Binds the server at `bind_address`, connects a client to the address the
/// server actually listens on, then has the server accept it. Whatever was
/// built is closed again if a step fails.
pub fn duct_pair_with_provider<T, P, C>(
    provider: P,
    bind_address: P::Address,
    codec: C,
    config: PairConfig,
) -> Result<(MessageServer<T, P, C>, MessageClient<T, P, C>)>
where
    P: SocketProvider + Clone,
    C: Codec<T> + Clone,
{
    let mut server =
        ServerDuct::new(provider.clone(), bind_address).with_config(config.transport.clone());
    server.bind()?;

    let listener_address = server
        .listener_address()
        .cloned()
        .ok_or_else(|| TransportError::InvalidState {
            operation: "listener_address",
            state: server.state(),
        })?;
    debug!(address = ?listener_address, "pair server bound");

    let mut client =
        ClientDuct::new(provider, listener_address.clone()).with_config(config.transport);
    client.connect()?;

    if !server.listen(config.listen_timeout)? {
        return Err(PairError::ListenTimedOut(config.listen_timeout));
    }
    info!(address = ?listener_address, "duct pair connected");

    let server = with_lock(
        MessageDuct::with_codec(server, codec.clone()).with_frame_config(config.frame.clone()),
        config.server_lock,
    );
    let client = with_lock(
        MessageDuct::with_codec(client, codec).with_frame_config(config.frame),
        config.client_lock,
    );
    Ok((server, client))
}

fn with_lock<D, T, C>(
    duct: MessageDuct<D, T, C>,
    lock: Option<Arc<dyn DuctLock>>,
) -> MessageDuct<D, T, C>
where
    D: RawDuct,
    C: Codec<T>,
{
    match lock {
        Some(lock) => duct.with_lock(lock),
        None => duct,
    }
}
