//! Message framing for ductworks.
//!
//! Every message travels as one frame:
//! - a 1-byte magic sentinel (`0x54`) for stream alignment
//! - a 4-byte big-endian payload length
//! - the payload, exactly that many bytes
//!
//! [`MessageDuct`] wraps a transport duct with a payload [`Codec`] and an
//! optional [`DuctLock`], so one `send` on one side is always one `recv` on
//! the other, however the socket splits the bytes.

pub mod codec;
pub mod duct;
pub mod error;
pub mod lock;
pub mod reader;
pub mod serialize;
pub mod writer;

pub use codec::{
    check_magic, decode_length, encode_frame, FrameConfig, HEADER_SIZE, LENGTH_SIZE, MAGIC,
    MAX_FRAME_PAYLOAD,
};
pub use duct::{MessageClient, MessageDuct, MessageServer};
pub use error::{FrameError, FramePhase, Result};
pub use lock::{DuctLock, FileLock, ThreadLock};
pub use reader::read_frame;
pub use serialize::{fn_codec, BytesCodec, Codec, CodecError, FnCodec, JsonCodec};
pub use writer::write_frame;
