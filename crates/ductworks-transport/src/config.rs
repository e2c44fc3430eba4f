use std::time::Duration;

/// Default backlog: exactly one peer is expected.
pub const DEFAULT_BACKLOG: u32 = 1;

/// Default wait for a peer in `listen`.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Default wait for readable data in `poll`.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for transport ducts.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Listen queue depth passed to listen(2). Default: 1.
    pub backlog: u32,
    /// Read/write timeout applied to the connection once established.
    /// `None` (the default) leaves the socket fully blocking.
    pub io_timeout: Option<Duration>,
    /// Upper bound on establishing an outgoing connection, where the
    /// transport supports one (TCP). Default: none.
    pub connect_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            io_timeout: None,
            connect_timeout: None,
        }
    }
}
