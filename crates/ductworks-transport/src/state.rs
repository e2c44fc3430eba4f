use std::fmt;

/// Lifecycle of a transport duct.
///
/// ```text
/// Idle ──bind──▶ AwaitingPeer ──listen──▶ Connected ──close──▶ Closed
///  └────────────────connect─────────────────┘
/// ```
///
/// `Closed` is terminal. Only the server side passes through `AwaitingPeer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuctState {
    Idle,
    AwaitingPeer,
    Connected,
    Closed,
}

impl fmt::Display for DuctState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DuctState::Idle => "idle",
            DuctState::AwaitingPeer => "awaiting peer",
            DuctState::Connected => "connected",
            DuctState::Closed => "closed",
        };
        f.write_str(name)
    }
}
