//! Wire codec for host transport frames.
//!
//! Format: 4-byte little-endian length prefix, then one kind byte, then the
//! payload. The length counts the kind byte plus the payload.
//!
//! The codec ensures:
//! - Frames are length-prefixed for stream framing
//! - Maximum frame size is enforced
//! - Partial reads return Ok(None) to support streaming

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{FRAME_HEADER_LEN, MAX_FRAME_SIZE};
use crate::error::{Error, Result};

use super::frame::Frame;

/// Codec for length-prefixed frames.
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a frame to bytes with length prefix.
    pub fn encode(frame: &Frame) -> Result<Bytes> {
        let body_len = 1 + frame.payload().len();
        if body_len > MAX_FRAME_SIZE {
            return Err(Error::Codec {
                message: format!(
                    "frame too large: {} bytes (max {})",
                    body_len, MAX_FRAME_SIZE
                ),
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + body_len);
        buf.put_u32_le(body_len as u32);
        buf.put_u8(frame.kind_byte());
        buf.put_slice(frame.payload());
        Ok(buf.freeze())
    }

    /// Decode a frame from a buffer.
    ///
    /// Returns:
    /// - Ok(Some(frame)) if a complete frame was decoded (buffer is advanced)
    /// - Ok(None) if more data is needed (buffer unchanged)
    /// - Err if the data is invalid
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>> {
        if buf.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

        if len == 0 {
            return Err(Error::Codec {
                message: "frame without kind byte".to_string(),
            });
        }
        if len > MAX_FRAME_SIZE {
            return Err(Error::Codec {
                message: format!("frame length {} exceeds maximum {}", len, MAX_FRAME_SIZE),
            });
        }

        if buf.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_LEN);
        let kind = buf.get_u8();
        let payload = buf.split_to(len - 1).freeze();

        Ok(Some(Frame::new(kind, payload)))
    }

    /// Decode from a slice (convenience for testing).
    pub fn decode_slice(data: &[u8]) -> Result<Option<Frame>> {
        let mut buf = BytesMut::from(data);
        Self::decode(&mut buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::CONTROL_FRAME_KIND;
    use crate::protocol::{ControlFrame, TermSize};

    #[test]
    fn encode_layout() {
        let frame = Frame::request(&b"ping"[..]);
        let encoded = FrameCodec::encode(&frame).unwrap();

        assert_eq!(&encoded[..4], &5u32.to_le_bytes());
        assert_eq!(encoded[4], 0x01);
        assert_eq!(&encoded[5..], b"ping");
    }

    #[test]
    fn decode_partial_returns_none() {
        let frame = Frame::control(&ControlFrame::Resize(TermSize { cols: 120, rows: 40 })).unwrap();
        let encoded = FrameCodec::encode(&frame).unwrap();

        let partial = &encoded[..encoded.len() / 2];
        assert!(FrameCodec::decode_slice(partial).unwrap().is_none());
    }

    #[test]
    fn decode_empty_returns_none() {
        assert!(FrameCodec::decode_slice(&[]).unwrap().is_none());
    }

    #[test]
    fn decode_zero_length_is_error() {
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        assert!(matches!(
            FrameCodec::decode(&mut buf),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn decode_length_too_large_returns_error() {
        let mut buf = BytesMut::new();
        buf.put_u32_le((MAX_FRAME_SIZE + 1) as u32);
        buf.put_slice(&[0u8; 16]);
        assert!(matches!(
            FrameCodec::decode(&mut buf),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn empty_payload_frame() {
        let frame = Frame::new(CONTROL_FRAME_KIND, Bytes::new());
        let encoded = FrameCodec::encode(&frame).unwrap();
        let decoded = FrameCodec::decode_slice(&encoded).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(decoded.payload().is_empty());
    }

    #[test]
    fn multiple_frames_in_buffer() {
        let f1 = Frame::request(&b"one"[..]);
        let f2 = Frame::control(&ControlFrame::Resize(TermSize { cols: 80, rows: 24 })).unwrap();
        let f3 = Frame::new(0x7E, &b"opaque"[..]);

        let mut buf = BytesMut::new();
        for frame in [&f1, &f2, &f3] {
            buf.extend_from_slice(&FrameCodec::encode(frame).unwrap());
        }

        assert_eq!(FrameCodec::decode(&mut buf).unwrap().unwrap(), f1);
        assert_eq!(FrameCodec::decode(&mut buf).unwrap().unwrap(), f2);
        assert_eq!(FrameCodec::decode(&mut buf).unwrap().unwrap(), f3);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_advances_buffer_only_on_success() {
        let encoded = FrameCodec::encode(&Frame::response(&b"pong"[..])).unwrap();

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 1]);
        let partial_len = buf.len();
        assert!(FrameCodec::decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), partial_len);
    }
}
