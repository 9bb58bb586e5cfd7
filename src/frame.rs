//! Frame codec for the child process wire protocol.
//!
//! Frame layout (5-byte header + variable payload):
//! ```text
//! | tag (1B) | payload_len (4B, big-endian) | payload (NB) |
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::ProtocolError;

pub const HEADER_SIZE: usize = 5;

/// A length ceiling past which a frame is treated as a protocol error
/// rather than an oversized-but-legitimate payload.
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Tag byte identifying a frame's payload kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Raw terminal output/input bytes.
    Data,
    /// A JSON control message.
    Meta,
    /// A binary-encoded tuple (currently only `deliver_chunk`).
    Packed,
    /// Anything else — tolerated for forward compatibility.
    Unknown(u8),
}

impl Tag {
    fn from_byte(b: u8) -> Self {
        match b {
            b'D' => Tag::Data,
            b'M' => Tag::Meta,
            b'P' => Tag::Packed,
            other => Tag::Unknown(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Tag::Data => b'D',
            Tag::Meta => b'M',
            Tag::Packed => b'P',
            Tag::Unknown(b) => b,
        }
    }
}

/// A decoded `(tag, payload)` pair, or end-of-stream.
pub struct Frame {
    pub tag: Tag,
    pub payload: Bytes,
}

/// Encode a single frame ready to write to the child's stdin.
pub fn encode(tag: Tag, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    buf.put_u8(tag.to_byte());
    buf.put_u32(payload.len() as u32);
    buf.put_slice(payload);
    buf.freeze()
}

/// Outcome of reading one frame from the child's stdout.
pub enum ReadOutcome {
    Frame(Frame),
    /// Clean EOF, or a short read ending exactly at a frame boundary —
    /// both are the expected shape of "the child exited".
    Eof,
}

/// Read exactly one frame from an async byte stream.
///
/// A short read while filling the tag or length header is reported as
/// [`ReadOutcome::Eof`] (the child simply closed its pipes); a short read
/// while filling an already-declared payload is also treated as `Eof`,
/// matching the original implementation's "IncompleteReadError is not an
/// error" behavior. An oversized declared length is a [`ProtocolError`].
pub async fn decode<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ReadOutcome, ProtocolError> {
    let mut tag_byte = [0u8; 1];
    if reader.read_exact(&mut tag_byte).await.is_err() {
        return Ok(ReadOutcome::Eof);
    }

    let mut len_bytes = [0u8; 4];
    if reader.read_exact(&mut len_bytes).await.is_err() {
        return Ok(ReadOutcome::Eof);
    }
    let len = u32::from_be_bytes(len_bytes);
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if reader.read_exact(&mut payload).await.is_err() {
        return Ok(ReadOutcome::Eof);
    }

    Ok(ReadOutcome::Frame(Frame {
        tag: Tag::from_byte(tag_byte[0]),
        payload: Bytes::from(payload),
    }))
}

/// Decode a single in-memory buffer, for use in tests. Mirrors [`decode`]
/// but over a plain byte slice rather than an async reader.
pub fn decode_slice(mut data: Bytes) -> Result<(Tag, Bytes), ProtocolError> {
    if data.len() < HEADER_SIZE {
        return Ok((Tag::Unknown(0), Bytes::new()));
    }
    let tag = Tag::from_byte(data.get_u8());
    let len = data.get_u32();
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_SIZE,
        });
    }
    let payload = data.split_to(len as usize);
    Ok((tag, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_each_tag() {
        for (tag, want) in [
            (Tag::Data, Tag::Data),
            (Tag::Meta, Tag::Meta),
            (Tag::Packed, Tag::Packed),
        ] {
            let payload = b"hello world";
            let encoded = encode(tag, payload);
            let mut cursor = std::io::Cursor::new(encoded.to_vec());
            match decode(&mut cursor).await.unwrap() {
                ReadOutcome::Frame(frame) => {
                    assert_eq!(frame.tag, want);
                    assert_eq!(&frame.payload[..], payload);
                }
                ReadOutcome::Eof => panic!("expected a frame"),
            }
        }
    }

    #[tokio::test]
    async fn empty_payload_round_trips() {
        let encoded = encode(Tag::Data, b"");
        let mut cursor = std::io::Cursor::new(encoded.to_vec());
        match decode(&mut cursor).await.unwrap() {
            ReadOutcome::Frame(frame) => assert!(frame.payload.is_empty()),
            ReadOutcome::Eof => panic!("expected a frame"),
        }
    }

    #[tokio::test]
    async fn short_read_is_eof_not_error() {
        let mut cursor = std::io::Cursor::new(vec![b'D', 0, 0]);
        match decode(&mut cursor).await.unwrap() {
            ReadOutcome::Eof => {}
            ReadOutcome::Frame(_) => panic!("expected eof"),
        }
    }

    #[tokio::test]
    async fn oversized_length_is_protocol_error() {
        let mut header = vec![b'D'];
        header.extend_from_slice(&(MAX_FRAME_SIZE + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(header);
        assert!(matches!(
            decode(&mut cursor).await,
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_tag_is_tolerated() {
        let encoded = encode(Tag::Unknown(b'X'), b"whatever");
        let mut cursor = std::io::Cursor::new(encoded.to_vec());
        match decode(&mut cursor).await.unwrap() {
            ReadOutcome::Frame(frame) => assert_eq!(frame.tag, Tag::Unknown(b'X')),
            ReadOutcome::Eof => panic!("expected a frame"),
        }
    }
}
