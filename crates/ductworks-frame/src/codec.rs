use bytes::{BufMut, BytesMut};

use crate::error::{FrameError, Result};

/// Magic sentinel that opens every frame.
pub const MAGIC: u8 = 0x54;

/// Size of the big-endian length prefix.
pub const LENGTH_SIZE: usize = 4;

/// Frame header: magic (1) + length (4) = 5 bytes.
pub const HEADER_SIZE: usize = 1 + LENGTH_SIZE;

/// Largest payload the length prefix can describe.
pub const MAX_FRAME_PAYLOAD: usize = u32::MAX as usize;

/// Configuration for framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, applied on send and on receive.
    /// Default: the full range of the length prefix.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: MAX_FRAME_PAYLOAD,
        }
    }
}

impl FrameConfig {
    /// The effective limit, never above what the length prefix can carry.
    pub fn payload_limit(&self) -> usize {
        self.max_payload_size.min(MAX_FRAME_PAYLOAD)
    }

    pub(crate) fn check_payload(&self, size: usize) -> Result<()> {
        let max = self.payload_limit();
        if size > max {
            return Err(FrameError::PayloadTooLarge { size, max });
        }
        Ok(())
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────┬──────────────────┐
/// │ Magic (1B)   │ Length       │ Payload          │
/// │ 0x54         │ (4B BE)      │ (Length bytes)   │
/// └──────────────┴──────────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_FRAME_PAYLOAD,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(MAGIC);
    dst.put_u32(len);
    dst.put_slice(payload);
    Ok(())
}

/// Validate the sentinel byte at the head of a frame.
pub fn check_magic(byte: u8) -> Result<()> {
    if byte != MAGIC {
        return Err(FrameError::ProtocolViolation {
            expected: MAGIC,
            actual: byte,
        });
    }
    Ok(())
}

/// Interpret a length prefix.
pub fn decode_length(prefix: [u8; LENGTH_SIZE]) -> usize {
    u32::from_be_bytes(prefix) as usize
}

/// Decode one frame from a buffer. Returns `Ok(None)` until the buffer
/// holds a complete frame; on success the frame bytes are consumed.
#[cfg(test)]
pub(crate) fn decode_frame(
    src: &mut BytesMut,
    max_payload: usize,
) -> Result<Option<bytes::Bytes>> {
    use bytes::Buf;

    let Some(&first) = src.first() else {
        return Ok(None);
    };
    check_magic(first)?;

    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; LENGTH_SIZE];
    prefix.copy_from_slice(&src[1..HEADER_SIZE]);
    let payload_len = decode_length(prefix);

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}
