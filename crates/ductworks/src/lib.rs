//! Pipe-like message IPC over byte-stream sockets.
//!
//! One `send` on one end yields exactly one `recv` on the other, whether the
//! ducts talk over a Unix domain socket or TCP.
//!
//! # Crate Structure
//!
//! - [`transport`]: server and client socket ducts, socket providers
//! - [`frame`]: magic-byte framing, payload codecs, locks, message ducts
//! - [`pair`]: connected duct pairs (behind the `pair` feature)

/// Re-export transport types.
pub mod transport {
    pub use ductworks_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use ductworks_frame::*;
}

/// Re-export pair factory types (requires `pair` feature).
#[cfg(feature = "pair")]
pub mod pair {
    pub use ductworks_pair::*;
}
