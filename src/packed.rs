//! Binary value codec for `Packed` frame payloads.
//!
//! A self-describing, type-tagged TLV stream: one `u8` element count,
//! followed by one tagged value per element. Hand-rolled in the same style
//! as [`crate::frame`] rather than delegated to a general-purpose
//! serialization crate, since the wire format is tiny and fixed.
//!
//! ```text
//! | count (1B) | value... |
//! value := tag (1B) | data
//!   Null  = 0x00                         (no data)
//!   Bool  = 0x01 | 1B (0 or 1)
//!   Int   = 0x02 | 8B signed big-endian
//!   Float = 0x03 | 8B IEEE-754 big-endian
//!   Str   = 0x04 | 4B len | UTF-8 bytes
//!   Bytes = 0x05 | 4B len | raw bytes
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;

/// A single decoded value from a packed tuple.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Bytes),
}

impl Value {
    fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Value::Null => buf.put_u8(TAG_NULL),
            Value::Bool(b) => {
                buf.put_u8(TAG_BOOL);
                buf.put_u8(*b as u8);
            }
            Value::Int(i) => {
                buf.put_u8(TAG_INT);
                buf.put_i64(*i);
            }
            Value::Float(f) => {
                buf.put_u8(TAG_FLOAT);
                buf.put_f64(*f);
            }
            Value::Str(s) => {
                buf.put_u8(TAG_STR);
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Value::Bytes(b) => {
                buf.put_u8(TAG_BYTES);
                buf.put_u32(b.len() as u32);
                buf.put_slice(b);
            }
        }
    }
}

/// Encode a tuple of values into a single packed payload.
pub fn encode(values: &[Value]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(values.len() as u8);
    for v in values {
        v.encode_into(&mut buf);
    }
    buf.freeze()
}

/// Decode a packed payload into its ordered tuple of values.
pub fn decode(mut data: Bytes) -> Result<Vec<Value>, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::InvalidPacked("empty payload".into()));
    }
    let count = data.get_u8() as usize;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(decode_one(&mut data)?);
    }
    Ok(values)
}

fn decode_one(data: &mut Bytes) -> Result<Value, ProtocolError> {
    if data.is_empty() {
        return Err(ProtocolError::InvalidPacked("truncated value".into()));
    }
    match data.get_u8() {
        TAG_NULL => Ok(Value::Null),
        TAG_BOOL => {
            require(data, 1)?;
            Ok(Value::Bool(data.get_u8() != 0))
        }
        TAG_INT => {
            require(data, 8)?;
            Ok(Value::Int(data.get_i64()))
        }
        TAG_FLOAT => {
            require(data, 8)?;
            Ok(Value::Float(data.get_f64()))
        }
        TAG_STR => {
            let len = read_len(data)?;
            require(data, len)?;
            let bytes = data.split_to(len);
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| ProtocolError::InvalidPacked(format!("invalid utf-8: {e}")))?;
            Ok(Value::Str(s))
        }
        TAG_BYTES => {
            let len = read_len(data)?;
            require(data, len)?;
            Ok(Value::Bytes(data.split_to(len)))
        }
        other => Err(ProtocolError::InvalidPacked(format!(
            "unknown value tag 0x{other:02x}"
        ))),
    }
}

fn read_len(data: &mut Bytes) -> Result<usize, ProtocolError> {
    require(data, 4)?;
    Ok(data.get_u32() as usize)
}

fn require(data: &Bytes, n: usize) -> Result<(), ProtocolError> {
    if data.remaining() < n {
        Err(ProtocolError::InvalidPacked("truncated value".into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_deliver_chunk_with_bytes() {
        let values = vec![
            Value::Str("deliver_chunk".to_string()),
            Value::Str("k1".to_string()),
            Value::Bytes(Bytes::from_static(b"hi")),
        ];
        let encoded = encode(&values);
        let decoded = decode(encoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn round_trips_deliver_chunk_with_string_chunk() {
        let values = vec![
            Value::Str("deliver_chunk".to_string()),
            Value::Str("k2".to_string()),
            Value::Str("hi".to_string()),
        ];
        let encoded = encode(&values);
        let decoded = decode(encoded).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn distinguishes_string_from_bytes() {
        let as_bytes = encode(&[Value::Bytes(Bytes::from_static(b"x"))]);
        let as_str = encode(&[Value::Str("x".to_string())]);
        assert_ne!(as_bytes, as_str);
    }

    #[test]
    fn truncated_value_is_an_error() {
        let mut encoded = encode(&[Value::Int(42)]).to_vec();
        encoded.truncate(encoded.len() - 1);
        assert!(decode(Bytes::from(encoded)).is_err());
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert!(decode(Bytes::new()).is_err());
    }
}
