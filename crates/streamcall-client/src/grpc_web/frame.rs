//! grpc-web message framing
//!
//! Every frame is a flag byte, a big-endian u32 length and the payload.
//! Data frames carry one encoded message; the trailer frame carries
//! HTTP/1-style `key: value\r\n` lines with the call status.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use percent_encoding::percent_decode_str;
use streamcall_core::{Code, Metadata, Status, TransportError};
use tracing::trace;

pub const DATA_FRAME: u8 = 0x00;
pub const TRAILER_FRAME: u8 = 0x80;
pub const COMPRESSED_FLAG: u8 = 0x01;

/// Flag byte plus length prefix
pub const HEADER_LEN: usize = 5;

/// Largest frame accepted by default (4 MiB)
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

pub const GRPC_STATUS: &str = "grpc-status";
pub const GRPC_MESSAGE: &str = "grpc-message";

/// One decoded frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data(Bytes),
    Trailers(Metadata),
}

/// Encode one uncompressed data frame
pub fn encode_frame(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.put_u8(DATA_FRAME);
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode a trailer frame carrying `status` and its metadata
pub fn encode_trailers(status: &Status) -> Bytes {
    let mut block = format!("{}: {}\r\n", GRPC_STATUS, status.code.as_i32());
    if !status.message.is_empty() {
        block.push_str(&format!(
            "{}: {}\r\n",
            GRPC_MESSAGE,
            encode_grpc_message(&status.message)
        ));
    }
    for (key, value) in status.metadata.iter() {
        block.push_str(&format!("{}: {}\r\n", key, value));
    }

    let mut buf = BytesMut::with_capacity(HEADER_LEN + block.len());
    buf.put_u8(TRAILER_FRAME);
    buf.put_u32(block.len() as u32);
    buf.put_slice(block.as_bytes());
    buf.freeze()
}

/// Percent-encode a status message for the `grpc-message` field
pub fn encode_grpc_message(message: &str) -> String {
    percent_encoding::utf8_percent_encode(message, GRPC_MESSAGE_SET).to_string()
}

/// Everything outside printable ASCII, plus `%` itself
const GRPC_MESSAGE_SET: &percent_encoding::AsciiSet = &percent_encoding::CONTROLS.add(b'%');

/// Incremental frame decoder
///
/// Accepts the response body in arbitrary chunks and yields every frame
/// completed so far.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_len: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::with_max_frame_len(DEFAULT_MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(max_frame_len: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_len,
        }
    }

    /// Feed bytes into the decoder and extract any complete frames
    ///
    /// After an error the buffered input is discarded.
    pub fn feed(&mut self, bytes: Bytes) -> Vec<Result<Frame, TransportError>> {
        let mut frames = Vec::new();
        self.buffer.extend_from_slice(&bytes);

        while self.buffer.len() >= HEADER_LEN {
            let flag = self.buffer[0];
            let len = u32::from_be_bytes([
                self.buffer[1],
                self.buffer[2],
                self.buffer[3],
                self.buffer[4],
            ]) as usize;

            if flag & COMPRESSED_FLAG != 0 {
                self.buffer.clear();
                frames.push(Err(TransportError::ProtocolError(
                    "compressed frames are not supported".into(),
                )));
                break;
            }
            if len > self.max_frame_len {
                self.buffer.clear();
                frames.push(Err(TransportError::ProtocolError(format!(
                    "frame of {} bytes exceeds limit of {}",
                    len, self.max_frame_len
                ))));
                break;
            }
            if self.buffer.len() < HEADER_LEN + len {
                break;
            }

            self.buffer.advance(HEADER_LEN);
            let payload = self.buffer.split_to(len).freeze();
            trace!(flag, len, "Decoded frame");

            if flag & TRAILER_FRAME != 0 {
                match parse_trailers(&payload) {
                    Ok(trailers) => frames.push(Ok(Frame::Trailers(trailers))),
                    Err(e) => {
                        self.buffer.clear();
                        frames.push(Err(e));
                        break;
                    }
                }
            } else {
                frames.push(Ok(Frame::Data(payload)));
            }
        }

        frames
    }

    /// Whether a frame has been started but not completed
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }
}

/// Parse a trailer block into metadata
pub fn parse_trailers(block: &[u8]) -> Result<Metadata, TransportError> {
    let text = std::str::from_utf8(block)
        .map_err(|_| TransportError::ProtocolError("Invalid UTF-8 in trailers".into()))?;

    let mut metadata = Metadata::new();
    for line in text.split("\r\n").flat_map(|l| l.split('\n')) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once(':').ok_or_else(|| {
            TransportError::ProtocolError(format!("Malformed trailer line: {}", line))
        })?;
        metadata.insert(key.trim(), value.trim());
    }
    Ok(metadata)
}

/// Build the call status out of trailers (or trailers-only headers)
///
/// Returns `None` when no `grpc-status` is present. Remaining entries become
/// the status metadata.
pub fn status_from_metadata(metadata: &Metadata) -> Option<Status> {
    let raw = metadata.get(GRPC_STATUS)?;
    let code = raw
        .trim()
        .parse::<i32>()
        .map(Code::from_i32)
        .unwrap_or(Code::Unknown);

    let message = metadata
        .get(GRPC_MESSAGE)
        .map(|m| percent_decode_str(m).decode_utf8_lossy().into_owned())
        .unwrap_or_default();

    let rest = metadata
        .iter()
        .filter(|(key, _)| *key != GRPC_STATUS && *key != GRPC_MESSAGE)
        .collect();

    Some(Status::new(code, message).with_metadata(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_data_and_trailers() {
        let mut body = BytesMut::new();
        body.extend_from_slice(&encode_frame(br#"{"message":"hi"}"#));
        body.extend_from_slice(&encode_trailers(&Status::ok()));

        let mut decoder = FrameDecoder::new();
        let frames: Vec<_> = decoder
            .feed(body.freeze())
            .into_iter()
            .map(Result::unwrap)
            .collect();

        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0],
            Frame::Data(Bytes::from_static(br#"{"message":"hi"}"#))
        );
        let Frame::Trailers(trailers) = &frames[1] else {
            panic!("expected trailers");
        };
        assert_eq!(status_from_metadata(trailers), Some(Status::ok()));
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_decode_byte_by_byte() {
        let encoded = encode_frame(b"abc");
        let mut decoder = FrameDecoder::new();

        for (i, byte) in encoded.iter().enumerate() {
            let frames = decoder.feed(Bytes::copy_from_slice(&[*byte]));
            if i + 1 < encoded.len() {
                assert!(frames.is_empty());
                assert!(decoder.has_partial());
            } else {
                assert_eq!(frames.len(), 1);
                assert_eq!(
                    frames[0].as_ref().unwrap(),
                    &Frame::Data(Bytes::from_static(b"abc"))
                );
            }
        }
    }

    #[test]
    fn test_compressed_frame_rejected() {
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(Bytes::from_static(&[0x01, 0, 0, 0, 1, b'x']));
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], Err(TransportError::ProtocolError(_))));
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::with_max_frame_len(4);
        let frames = decoder.feed(encode_frame(b"too long"));
        assert!(matches!(frames[0], Err(TransportError::ProtocolError(_))));
    }

    #[test]
    fn test_status_message_is_percent_decoded() {
        let status = Status::unavailable("server 100% busy\nretry");
        let frames = FrameDecoder::new().feed(encode_trailers(&status));
        let Ok(Frame::Trailers(trailers)) = &frames[0] else {
            panic!("expected trailers");
        };

        let decoded = status_from_metadata(trailers).unwrap();
        assert_eq!(decoded.code, Code::Unavailable);
        assert_eq!(decoded.message, "server 100% busy\nretry");
    }

    #[test]
    fn test_trailer_metadata_kept() {
        let trailers = parse_trailers(b"grpc-status: 5\r\ngrpc-message: gone\r\nX-Trace: 42\r\n")
            .unwrap();
        let status = status_from_metadata(&trailers).unwrap();
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, "gone");
        assert_eq!(status.metadata.get("x-trace"), Some("42"));
        assert_eq!(status.metadata.len(), 1);
    }

    #[test]
    fn test_missing_or_garbled_status() {
        let trailers = parse_trailers(b"x-other: 1\r\n").unwrap();
        assert_eq!(status_from_metadata(&trailers), None);

        let trailers = parse_trailers(b"grpc-status: nope\r\n").unwrap();
        assert_eq!(status_from_metadata(&trailers).unwrap().code, Code::Unknown);
    }

    #[test]
    fn test_malformed_trailer_line() {
        assert!(parse_trailers(b"grpc-status 0\r\n").is_err());
    }
}
