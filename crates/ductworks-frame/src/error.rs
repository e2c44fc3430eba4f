use std::fmt;

use ductworks_transport::TransportError;

use crate::serialize::CodecError;

/// Where in a frame the peer's close was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Before the first byte of a frame: an orderly close.
    BeforeFrame,
    /// Inside the 4-byte length prefix.
    Length,
    /// Inside the payload.
    Payload,
    /// While writing a frame.
    Writing,
}

impl fmt::Display for FramePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FramePhase::BeforeFrame => "before frame",
            FramePhase::Length => "mid-frame (length prefix)",
            FramePhase::Payload => "mid-frame (payload)",
            FramePhase::Writing => "while writing frame",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while sending or receiving frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Transport-level error, including wrong-state calls.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The frame did not start with the magic sentinel. The stream is
    /// desynchronized and the duct should be closed.
    #[error("invalid magic byte at frame head (expected {expected:#04x}, got {actual:#04x})")]
    ProtocolViolation { expected: u8, actual: u8 },

    /// The peer closed its side of the connection.
    #[error("remote duct closed {phase}")]
    RemoteClosed { phase: FramePhase },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The configured serializer rejected the payload.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[source] CodecError),

    /// The configured deserializer rejected the received bytes.
    #[error("failed to deserialize payload: {0}")]
    Deserialize(#[source] CodecError),

    /// The duct lock could not be acquired.
    #[error("failed to acquire duct lock: {0}")]
    Lock(#[source] std::io::Error),
}

impl FrameError {
    /// True when the peer has gone away, before or during a frame.
    pub fn is_remote_closed(&self) -> bool {
        matches!(self, Self::RemoteClosed { .. })
    }

    /// True when the peer closed part-way through a frame.
    pub fn is_mid_frame_close(&self) -> bool {
        matches!(
            self,
            Self::RemoteClosed {
                phase: FramePhase::Length | FramePhase::Payload | FramePhase::Writing
            }
        )
    }

    /// True for a bad magic byte.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation { .. })
    }

    /// True when the call was made in the wrong lifecycle state.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_invalid_state())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
