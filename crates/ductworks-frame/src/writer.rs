use std::io::ErrorKind;

use bytes::BytesMut;
use ductworks_transport::{RawDuct, TransportError};
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, FramePhase, Result};

/// Frame `payload` and write all of it to `duct`.
///
/// Each underlying write may take only part of the frame; the remainder is
/// reissued until nothing is left. Interrupted writes are retried, any other
/// error aborts the frame.
pub fn write_frame<D: RawDuct + ?Sized>(
    duct: &D,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<()> {
    config.check_payload(payload.len())?;

    let mut frame = BytesMut::new();
    encode_frame(payload, &mut frame)?;

    let mut offset = 0usize;
    while offset < frame.len() {
        match duct.send(&frame[offset..]) {
            Ok(0) => {
                return Err(FrameError::RemoteClosed {
                    phase: FramePhase::Writing,
                })
            }
            Ok(n) => offset += n,
            Err(TransportError::Io(err)) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }

    trace!(payload_len = payload.len(), "frame written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::os::fd::RawFd;
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::BytesMut;
    use ductworks_transport::DuctState;

    use super::*;
    use crate::codec::{decode_frame, HEADER_SIZE, MAX_FRAME_PAYLOAD};

    /// Accepts at most `chunk` bytes per write, optionally failing the
    /// first call with `first_error`.
    struct ChunkedSink {
        chunk: usize,
        first_error: Mutex<Option<ErrorKind>>,
        data: Mutex<Vec<u8>>,
        calls: Mutex<usize>,
    }

    impl ChunkedSink {
        fn new(chunk: usize) -> Self {
            Self {
                chunk,
                first_error: Mutex::new(None),
                data: Mutex::new(Vec::new()),
                calls: Mutex::new(0),
            }
        }

        fn failing_once(chunk: usize, kind: ErrorKind) -> Self {
            let sink = Self::new(chunk);
            *sink.first_error.lock().unwrap() = Some(kind);
            sink
        }

        fn wire(&self) -> BytesMut {
            BytesMut::from(self.data.lock().unwrap().as_slice())
        }
    }

    impl RawDuct for ChunkedSink {
        fn send(&self, buf: &[u8]) -> ductworks_transport::Result<usize> {
            *self.calls.lock().unwrap() += 1;
            if let Some(kind) = self.first_error.lock().unwrap().take() {
                return Err(TransportError::Io(std::io::Error::from(kind)));
            }
            let n = buf.len().min(self.chunk);
            self.data.lock().unwrap().extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn recv_into(&self, _buf: &mut [u8]) -> ductworks_transport::Result<usize> {
            Ok(0)
        }

        fn poll(&self, _timeout: Duration) -> ductworks_transport::Result<bool> {
            Ok(false)
        }

        fn close(&mut self) -> ductworks_transport::Result<()> {
            Ok(())
        }

        fn state(&self) -> DuctState {
            DuctState::Connected
        }

        fn raw_fd(&self) -> Option<RawFd> {
            None
        }
    }

    #[test]
    fn write_single_frame() {
        let sink = ChunkedSink::new(usize::MAX);
        write_frame(&sink, b"hello", &FrameConfig::default()).unwrap();

        let mut wire = sink.wire();
        let payload = decode_frame(&mut wire, MAX_FRAME_PAYLOAD).unwrap().unwrap();
        assert_eq!(payload.as_ref(), b"hello");
        assert!(wire.is_empty());
    }

    #[test]
    fn partial_writes_are_reissued() {
        let payload = vec![0xAB; 1000];
        let sink = ChunkedSink::new(7);
        write_frame(&sink, &payload, &FrameConfig::default()).unwrap();

        let expected_calls = (HEADER_SIZE + payload.len()).div_ceil(7);
        assert_eq!(*sink.calls.lock().unwrap(), expected_calls);

        let mut wire = sink.wire();
        let decoded = decode_frame(&mut wire, MAX_FRAME_PAYLOAD).unwrap().unwrap();
        assert_eq!(decoded.as_ref(), payload.as_slice());
    }

    #[test]
    fn interrupted_write_retries() {
        let sink = ChunkedSink::failing_once(3, ErrorKind::Interrupted);
        write_frame(&sink, b"retry", &FrameConfig::default()).unwrap();

        let mut wire = sink.wire();
        let decoded = decode_frame(&mut wire, MAX_FRAME_PAYLOAD).unwrap().unwrap();
        assert_eq!(decoded.as_ref(), b"retry");
    }

    #[test]
    fn other_write_errors_propagate() {
        let sink = ChunkedSink::failing_once(3, ErrorKind::BrokenPipe);
        let err = write_frame(&sink, b"x", &FrameConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Transport(TransportError::Io(ref e)) if e.kind() == ErrorKind::BrokenPipe
        ));
    }

    #[test]
    fn zero_length_write_is_remote_closed() {
        let sink = ChunkedSink::new(0);
        let err = write_frame(&sink, b"x", &FrameConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            FrameError::RemoteClosed {
                phase: FramePhase::Writing
            }
        ));
    }

    #[test]
    fn oversized_payload_rejected_before_writing() {
        let sink = ChunkedSink::new(usize::MAX);
        let cfg = FrameConfig {
            max_payload_size: 4,
        };
        let err = write_frame(&sink, b"oversized", &cfg).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 9, max: 4 }));
        assert_eq!(*sink.calls.lock().unwrap(), 0);
    }

    #[test]
    fn empty_payload_writes_header_only() {
        let sink = ChunkedSink::new(usize::MAX);
        write_frame(&sink, b"", &FrameConfig::default()).unwrap();
        assert_eq!(sink.wire().as_ref(), &[0x54, 0, 0, 0, 0]);
    }
}
