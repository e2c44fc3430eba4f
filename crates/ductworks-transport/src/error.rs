use std::fmt;
use std::path::PathBuf;

use crate::state::DuctState;

/// The transport operation that raised a [`TransportError::CommunicationFault`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Bind,
    Listen,
    Accept,
    Connect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Bind => "bind",
            Operation::Listen => "listen",
            Operation::Accept => "accept",
            Operation::Connect => "connect",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in transport duct operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An operation was invoked in the wrong lifecycle state.
    ///
    /// This is a programming error on the caller's side, never a transport
    /// failure, and retrying it unchanged will fail the same way.
    #[error("cannot {operation} while duct is {state}")]
    InvalidState {
        operation: &'static str,
        state: DuctState,
    },

    /// The transport failed while binding, listening, accepting or connecting.
    #[error("communication fault during {operation} on {address}: {source}")]
    CommunicationFault {
        operation: Operation,
        address: String,
        source: std::io::Error,
    },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// An I/O error occurred on an established connection.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    pub(crate) fn fault(
        operation: Operation,
        address: impl fmt::Debug,
        source: std::io::Error,
    ) -> Self {
        Self::CommunicationFault {
            operation,
            address: format!("{address:?}"),
            source,
        }
    }

    /// True for [`TransportError::InvalidState`].
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState { .. })
    }

    /// True for [`TransportError::CommunicationFault`].
    pub fn is_communication_fault(&self) -> bool {
        matches!(self, Self::CommunicationFault { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
