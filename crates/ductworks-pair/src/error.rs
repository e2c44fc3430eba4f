use std::time::Duration;

/// Errors that can occur while assembling a duct pair.
#[derive(Debug, thiserror::Error)]
pub enum PairError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] ductworks_transport::TransportError),

    /// The client connected but the server saw no peer in time.
    #[error("server did not accept the client within {0:?}")]
    ListenTimedOut(Duration),
}

pub type Result<T> = std::result::Result<T, PairError>;
