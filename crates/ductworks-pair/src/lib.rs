//! Connected pairs of message ducts.
//!
//! The factory binds the server end first and reads back the address it
//! really listens on, so the client never races a listener that does not
//! exist yet.

pub mod error;
pub mod pair;

pub use error::{PairError, Result};
pub use pair::{duct_pair, duct_pair_with, duct_pair_with_provider, tcp_duct_pair, PairConfig};
