//! Pluggable message encodings.
//!
//! The connection never looks inside an encoded message; it only needs a
//! [`Serializer`] that maps a [`Message`] to bytes and back.

use bytes::{Buf, BufMut, Bytes};

use crate::message::Message;

/// Errors produced while encoding or decoding a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Topic name does not fit the length prefix.
    #[error("topic name too long ({len} bytes, max {max})")]
    TopicTooLong { len: usize, max: usize },

    /// Input ended before the declared topic name.
    #[error("truncated message: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Topic name bytes are not UTF-8.
    #[error("topic name is not valid UTF-8: {0}")]
    InvalidTopic(#[from] std::str::Utf8Error),
}

/// Encodes messages to bytes and decodes them back.
///
/// Implementations are shared between the publishing callers and the receive
/// task, so they must be `Send + Sync`.
pub trait Serializer: Send + Sync + 'static {
    /// Encode a message.
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, SerializeError>;

    /// Decode one frame into a message.
    fn deserialize(&self, bytes: &[u8]) -> Result<Message, SerializeError>;

    /// Short name used in logs and CLI flags.
    fn name(&self) -> &'static str;
}

/// `{"topic": "...", "body": [...]}` via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, SerializeError> {
        Ok(serde_json::to_vec(message)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message, SerializeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Compact binary encoding.
///
/// ```text
/// ┌────────────────┬───────────────┬──────────────────┐
/// │ Topic len (2B) │ Topic (UTF-8) │ Body (remaining) │
/// │ LE u16         │               │                  │
/// └────────────────┴───────────────┴──────────────────┘
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySerializer;

impl BinarySerializer {
    const TOPIC_LEN_SIZE: usize = 2;
    pub const MAX_TOPIC_LEN: usize = u16::MAX as usize;
}

impl Serializer for BinarySerializer {
    fn serialize(&self, message: &Message) -> Result<Vec<u8>, SerializeError> {
        let topic = message.topic().as_bytes();
        let topic_len = u16::try_from(topic.len()).map_err(|_| SerializeError::TopicTooLong {
            len: topic.len(),
            max: Self::MAX_TOPIC_LEN,
        })?;

        let mut out =
            Vec::with_capacity(Self::TOPIC_LEN_SIZE + topic.len() + message.body().len());
        out.put_u16_le(topic_len);
        out.put_slice(topic);
        out.put_slice(message.body());
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Message, SerializeError> {
        let mut buf = bytes;
        if buf.remaining() < Self::TOPIC_LEN_SIZE {
            return Err(SerializeError::Truncated {
                needed: Self::TOPIC_LEN_SIZE,
                available: buf.remaining(),
            });
        }
        let topic_len = buf.get_u16_le() as usize;
        if buf.remaining() < topic_len {
            return Err(SerializeError::Truncated {
                needed: topic_len,
                available: buf.remaining(),
            });
        }

        let topic = std::str::from_utf8(&buf[..topic_len])?.to_string();
        let body = Bytes::copy_from_slice(&buf[topic_len..]);
        Ok(Message::new(topic, body))
    }

    fn name(&self) -> &'static str {
        "binary"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let msg = Message::new("dog", &b"woof"[..]);
        let wire = JsonSerializer.serialize(&msg).unwrap();
        assert_eq!(JsonSerializer.deserialize(&wire).unwrap(), msg);
    }

    #[test]
    fn json_rejects_garbage() {
        let err = JsonSerializer.deserialize(b"not json").unwrap_err();
        assert!(matches!(err, SerializeError::Json(_)));
    }

    #[test]
    fn binary_layout() {
        let msg = Message::new("cat", &b"meow"[..]);
        let wire = BinarySerializer.serialize(&msg).unwrap();
        assert_eq!(wire, b"\x03\x00catmeow".to_vec());
        assert_eq!(BinarySerializer.deserialize(&wire).unwrap(), msg);
    }

    #[test]
    fn binary_empty_body() {
        let msg = Message::new("ping", Bytes::new());
        let wire = BinarySerializer.serialize(&msg).unwrap();
        let decoded = BinarySerializer.deserialize(&wire).unwrap();
        assert_eq!(decoded.topic(), "ping");
        assert!(decoded.body().is_empty());
    }

    #[test]
    fn binary_truncated_input() {
        assert!(matches!(
            BinarySerializer.deserialize(b"\x01"),
            Err(SerializeError::Truncated { needed: 2, available: 1 })
        ));
        assert!(matches!(
            BinarySerializer.deserialize(b"\x05\x00ab"),
            Err(SerializeError::Truncated { needed: 5, available: 2 })
        ));
    }

    #[test]
    fn binary_invalid_utf8_topic() {
        let err = BinarySerializer.deserialize(b"\x02\x00\xff\xfebody").unwrap_err();
        assert!(matches!(err, SerializeError::InvalidTopic(_)));
    }

    #[test]
    fn binary_topic_too_long() {
        let msg = Message::new("t".repeat(BinarySerializer::MAX_TOPIC_LEN + 1), Bytes::new());
        let err = BinarySerializer.serialize(&msg).unwrap_err();
        assert!(matches!(err, SerializeError::TopicTooLong { .. }));
    }

    #[test]
    fn serializer_names() {
        assert_eq!(JsonSerializer.name(), "json");
        assert_eq!(BinarySerializer.name(), "binary");
    }
}
