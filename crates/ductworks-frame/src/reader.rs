use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use ductworks_transport::{RawDuct, TransportError};
use tracing::trace;

use crate::codec::{check_magic, decode_length, FrameConfig, LENGTH_SIZE};
use crate::error::{FrameError, FramePhase, Result};

/// Read one complete frame from `duct` and return its payload.
///
/// Blocks until the whole frame has arrived, however the bytes are split
/// across underlying reads. The peer closing before the first byte is
/// reported as [`FramePhase::BeforeFrame`]; closing later is a mid-frame
/// close.
pub fn read_frame<D: RawDuct + ?Sized>(duct: &D, config: &FrameConfig) -> Result<Bytes> {
    let mut magic = [0u8; 1];
    read_exact(duct, &mut magic, FramePhase::BeforeFrame)?;
    check_magic(magic[0])?;

    let mut prefix = [0u8; LENGTH_SIZE];
    read_exact(duct, &mut prefix, FramePhase::Length)?;
    let payload_len = decode_length(prefix);
    config.check_payload(payload_len)?;

    let mut payload = BytesMut::zeroed(payload_len);
    read_exact(duct, &mut payload, FramePhase::Payload)?;

    trace!(payload_len, "frame read");
    Ok(payload.freeze())
}

fn read_exact<D: RawDuct + ?Sized>(duct: &D, buf: &mut [u8], phase: FramePhase) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match duct.recv_into(&mut buf[filled..]) {
            Ok(0) => return Err(FrameError::RemoteClosed { phase }),
            Ok(n) => filled += n,
            Err(TransportError::Io(err)) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
