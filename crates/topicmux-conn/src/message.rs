use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A message relating to a topic.
///
/// Immutable once constructed; the body is an opaque byte sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    topic: String,
    body: Bytes,
}

impl Message {
    /// Create a message for `topic`.
    pub fn new(topic: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            body: body.into(),
        }
    }

    /// Name of the topic this message is published under.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Opaque payload.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Split into topic name and body.
    pub fn into_parts(self) -> (String, Bytes) {
        (self.topic, self.body)
    }
}
