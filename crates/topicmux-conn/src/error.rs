use std::sync::Arc;

use topicmux_frame::FrameError;
use topicmux_transport::TransportError;

use crate::serializer::SerializeError;

/// Errors that can occur in multiplexed connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// Transport-level error (dial, bind, accept).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error while writing to the stream.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The serializer could not encode the outgoing message.
    #[error("encode failed: {0}")]
    Encode(#[source] SerializeError),

    /// A topic with the same name is already registered on this connection.
    #[error("topic '{0}' is already registered")]
    DuplicateTopic(String),

    /// The topic is attached to another connection or was already released.
    #[error("topic '{0}' belongs to another connection")]
    TopicInUse(String),

    /// The connection has been closed.
    #[error("connection closed")]
    Closed,

    /// Shutting down the write side of the stream failed during close.
    #[error("close failed: {0}")]
    Close(#[source] Arc<FrameError>),
}

pub type Result<T> = std::result::Result<T, ConnError>;
