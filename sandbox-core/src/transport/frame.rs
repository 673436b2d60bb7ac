//! Connect-RPC streaming frame codec.
//!
//! Wire format: each frame is a 1-byte flags field, a
//! 4-byte big-endian length, and the payload. A frame with `FLAG_END_STREAM`
//! set carries the terminal trailers (including status) instead of a
//! message.

use bytes::Buf;
use bytes::Bytes;
use bytes::BytesMut;

use crate::error::Result;
use crate::error::SandboxError;

pub const FLAG_END_STREAM: u8 = 0x02;

const HEADER_LEN: usize = 5;

/// Maximum single-frame payload size accepted from the wire. Guards against
/// a corrupt or malicious length prefix causing unbounded buffering.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Frame {
    pub flags: u8,
    pub payload: Bytes,
}

impl Frame {
    pub fn is_end_stream(&self) -> bool {
        self.flags & FLAG_END_STREAM != 0
    }

    pub fn encode(flags: u8, payload: &[u8]) -> Bytes {
        let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&[flags]);
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out.freeze()
    }
}

/// Incrementally decodes frames from a byte stream that may deliver chunks
/// at arbitrary boundaries (HTTP/2 does not align frames with transport
/// reads). Buffers partial frames across `push` calls.
#[derive(Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly-received bytes and drains every complete frame currently
    /// available. Leftover partial-frame bytes remain buffered for the next
    /// call.
    pub fn push(&mut self, chunk: Bytes) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(&chunk);
        let mut frames = Vec::new();
        loop {
            if self.buf.len() < HEADER_LEN {
                break;
            }
            let flags = self.buf[0];
            let len = u32::from_be_bytes([self.buf[1], self.buf[2], self.buf[3], self.buf[4]]);
            if len > MAX_FRAME_LEN {
                return Err(SandboxError::Sandbox(format!(
                    "frame length {len} exceeds maximum {MAX_FRAME_LEN}"
                )));
            }
            let total = HEADER_LEN + len as usize;
            if self.buf.len() < total {
                break;
            }
            self.buf.advance(HEADER_LEN);
            let payload = self.buf.split_to(len as usize).freeze();
            frames.push(Frame { flags, payload });
        }
        Ok(frames)
    }

    /// `true` if there are leftover bytes that never completed a frame. A
    /// caller should treat this as an error once the underlying stream has
    /// ended.
    pub fn has_trailing_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]
    use super::*;

    #[test]
    fn decodes_single_frame_delivered_whole() {
        let mut dec = FrameDecoder::new();
        let encoded = Frame::encode(0, b"hello");
        let frames = dec.push(encoded).expect("decode");
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0].payload[..], b"hello");
        assert!(!frames[0].is_end_stream());
        assert!(!dec.has_trailing_partial());
    }

    #[test]
    fn decodes_frame_split_across_many_chunk_boundaries() {
        let mut dec = FrameDecoder::new();
        let encoded = Frame::encode(FLAG_END_STREAM, b"trailer-json");
        let mut collected = Vec::new();
        for byte in encoded.iter() {
            let frames = dec.push(Bytes::copy_from_slice(&[*byte])).expect("decode");
            collected.extend(frames);
        }
        assert_eq!(collected.len(), 1);
        assert!(collected[0].is_end_stream());
        assert_eq!(&collected[0].payload[..], b"trailer-json");
    }

    #[test]
    fn decodes_multiple_frames_in_one_chunk() {
        let mut dec = FrameDecoder::new();
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&Frame::encode(0, b"one"));
        bytes.extend_from_slice(&Frame::encode(0, b"two"));
        bytes.extend_from_slice(&Frame::encode(FLAG_END_STREAM, b"end"));
        let frames = dec.push(bytes.freeze()).expect("decode");
        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0].payload[..], b"one");
        assert_eq!(&frames[1].payload[..], b"two");
        assert!(frames[2].is_end_stream());
        assert!(!dec.has_trailing_partial());
    }

    #[test]
    fn rejects_absurd_length_prefix() {
        let mut dec = FrameDecoder::new();
        let mut bytes = BytesMut::new();
        bytes.extend_from_slice(&[0u8]);
        bytes.extend_from_slice(&(u32::MAX).to_be_bytes());
        let err = dec.push(bytes.freeze()).unwrap_err();
        assert!(matches!(err, SandboxError::Sandbox(_)));
    }
}
