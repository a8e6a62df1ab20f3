//! Wire frame format for streaming dispatch.
//!
//! `code:u8 | length:u32-big-endian | payload:bytes[length]`. Multiple
//! frames concatenate with no separator or trailer.

use bytes::{Bytes, BytesMut};

/// A single streamed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: FrameCode,
    pub payload: Bytes,
}

/// Frame discriminants as used by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCode {
    /// Final result bytes.
    Result = 0,
    /// Reserved, never emitted by this implementation.
    Reserved = 1,
    /// User-facing error message.
    Error = 2,
    /// Decimal ASCII queue position.
    QueuePosition = 3,
    /// Dispatch has begun; empty payload.
    DispatchBegun = 4,
}

impl FrameCode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FrameCode::Result),
            1 => Some(FrameCode::Reserved),
            2 => Some(FrameCode::Error),
            3 => Some(FrameCode::QueuePosition),
            4 => Some(FrameCode::DispatchBegun),
            _ => None,
        }
    }
}

impl Frame {
    pub fn new(code: FrameCode, payload: impl Into<Bytes>) -> Self {
        Self {
            code,
            payload: payload.into(),
        }
    }

    pub fn result(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameCode::Result, payload)
    }

    pub fn error(message: impl AsRef<str>) -> Self {
        Self::new(FrameCode::Error, Bytes::copy_from_slice(message.as_ref().as_bytes()))
    }

    pub fn queue_position(pos: u64) -> Self {
        Self::new(
            FrameCode::QueuePosition,
            Bytes::copy_from_slice(pos.to_string().as_bytes()),
        )
    }

    pub fn dispatch_begun() -> Self {
        Self::new(FrameCode::DispatchBegun, Bytes::new())
    }

    /// Encode as `code | length(BE u32) | payload`.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(5 + self.payload.len());
        buf.extend_from_slice(&[self.code.as_u8()]);
        buf.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode exactly one frame from the front of `buf`, returning the
    /// frame and the number of bytes consumed, or `None` if `buf` does not
    /// yet contain a complete frame.
    pub fn decode(buf: &[u8]) -> Option<(Frame, usize)> {
        if buf.len() < 5 {
            return None;
        }
        let code = FrameCode::from_u8(buf[0])?;
        let len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;
        if buf.len() < 5 + len {
            return None;
        }
        let payload = Bytes::copy_from_slice(&buf[5..5 + len]);
        Some((Frame { code, payload }, 5 + len))
    }

    /// Decode the queue position payload back to an integer, for round-trip
    /// verification against the value written to the store at the same
    /// edge.
    pub fn decode_queue_position(&self) -> Option<u64> {
        std::str::from_utf8(&self.payload).ok()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trips() {
        for frame in [
            Frame::result(Bytes::from_static(b"hello")),
            Frame::error("Translation failed: boom"),
            Frame::queue_position(7),
            Frame::dispatch_begun(),
        ] {
            let encoded = frame.encode();
            let (decoded, consumed) = Frame::decode(&encoded).unwrap();
            assert_eq!(consumed, encoded.len());
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn encode_matches_wire_layout() {
        let frame = Frame::result(Bytes::from_static(b"ab"));
        let encoded = frame.encode();
        assert_eq!(encoded[0], 0);
        assert_eq!(&encoded[1..5], &[0, 0, 0, 2]);
        assert_eq!(&encoded[5..], b"ab");
    }

    #[test]
    fn decode_returns_none_on_incomplete_buffer() {
        let frame = Frame::result(Bytes::from_static(b"hello world"));
        let encoded = frame.encode();
        assert!(Frame::decode(&encoded[..encoded.len() - 1]).is_none());
    }

    #[test]
    fn queue_position_round_trips_to_integer() {
        let frame = Frame::queue_position(42);
        assert_eq!(frame.decode_queue_position(), Some(42));
    }

    #[test]
    fn concatenated_frames_decode_in_sequence() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::queue_position(1).encode());
        buf.extend_from_slice(&Frame::dispatch_begun().encode());
        buf.extend_from_slice(&Frame::result(Bytes::from_static(b"done")).encode());

        let mut offset = 0;
        let mut frames = Vec::new();
        while offset < buf.len() {
            let (frame, consumed) = Frame::decode(&buf[offset..]).unwrap();
            frames.push(frame);
            offset += consumed;
        }

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].code, FrameCode::QueuePosition);
        assert_eq!(frames[1].code, FrameCode::DispatchBegun);
        assert_eq!(frames[2].code, FrameCode::Result);
    }
}
