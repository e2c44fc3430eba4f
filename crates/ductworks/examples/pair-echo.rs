//! Echo over a pseudo-anonymous Unix socket pair.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example pair-echo

use std::thread;

use ductworks::pair::duct_pair;
use ductworks::transport::DEFAULT_POLL_TIMEOUT;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
enum Message {
    Text(String),
    Done,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (server, client) = duct_pair::<Message>()?;
    if let Some(path) = server.listener_address() {
        eprintln!("Pair connected via {}", path.display());
    }

    let echo = thread::spawn(move || -> Result<(), ductworks::frame::FrameError> {
        loop {
            let msg = server.recv()?;
            let done = matches!(msg, Message::Done);
            server.send(&msg)?;
            if done {
                return Ok(());
            }
        }
    });

    for word in ["pipes", "without", "pipes"] {
        client.send(&Message::Text(word.to_string()))?;
        if !client.poll(DEFAULT_POLL_TIMEOUT)? {
            return Err("echo thread went quiet".into());
        }
        eprintln!("Echoed: {:?}", client.recv()?);
    }
    client.send(&Message::Done)?;
    client.recv()?;

    echo.join().map_err(|_| "echo thread panicked")??;
    Ok(())
}
