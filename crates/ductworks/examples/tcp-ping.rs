//! Ping-pong round trips over a TCP pair on an ephemeral localhost port.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example tcp-ping

use std::time::Instant;

use ductworks::frame::JsonCodec;
use ductworks::pair::{tcp_duct_pair, PairConfig};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const ROUNDS: u64 = 1000;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (server, client) =
        tcp_duct_pair::<Value, _>("127.0.0.1", JsonCodec, PairConfig::default())?;
    if let Some(address) = server.listener_address() {
        eprintln!("Listening on {address}");
    }

    let started = Instant::now();
    for seq in 0..ROUNDS {
        client.send(&json!({"ping": seq}))?;
        let ping = server.recv()?;
        server.send(&json!({"pong": ping["ping"]}))?;
        let pong = client.recv()?;
        if pong["pong"] != seq {
            return Err(format!("round {seq} answered with {pong}").into());
        }
    }

    let elapsed = started.elapsed();
    eprintln!(
        "{ROUNDS} round trips in {elapsed:?} ({:?} each)",
        elapsed / ROUNDS as u32
    );
    Ok(())
}
