//! Socket ducts: the transport layer of ductworks.
//!
//! A duct is one endpoint of a message channel. This crate owns the socket
//! lifecycle for both roles:
//! - [`ServerDuct`] binds a listener, accepts exactly one peer and then
//!   releases the listener
//! - [`ClientDuct`] connects to a listening server duct
//!
//! Both expose the raw, non-looping [`RawDuct`] contract. Sockets come from a
//! [`SocketProvider`]; [`UdsProvider`] (filesystem paths) and [`TcpProvider`]
//! (host and port) are built in.

#[cfg(not(unix))]
compile_error!("ductworks-transport currently supports Unix platforms only");

pub mod client;
pub mod config;
pub mod error;
pub mod server;
pub mod state;
mod sys;
pub mod tcp;
pub mod traits;
pub mod uds;

pub use client::ClientDuct;
pub use config::{TransportConfig, DEFAULT_BACKLOG, DEFAULT_LISTEN_TIMEOUT, DEFAULT_POLL_TIMEOUT};
pub use error::{Operation, Result, TransportError};
pub use server::ServerDuct;
pub use state::DuctState;
pub use tcp::{TcpAddress, TcpProvider};
pub use traits::{DuctListener, DuctStream, RawDuct, SocketProvider};
pub use uds::{anonymous_socket_path, UdsListener, UdsProvider};
