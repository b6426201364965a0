//! Diagnostics emitted by the receive loop.
//!
//! Every connection reports dropped frames, retries and its final close reason
//! to an injected [`MuxObserver`]. The default [`TracingObserver`] turns them
//! into `tracing` events; tests plug in their own observer to assert on them.

use topicmux_frame::FrameError;

use crate::conn::CloseReason;
use crate::serializer::SerializeError;

/// Something noteworthy happened on a connection.
#[derive(Debug, Clone, Copy)]
pub enum MuxEvent<'a> {
    /// A frame could not be decoded and was discarded.
    FrameDropped {
        len: usize,
        error: &'a SerializeError,
    },
    /// A decoded message named a topic with no local registration.
    UnknownTopic { topic: &'a str },
    /// Some subscribers of `topic` had full queues and missed a body.
    DeliveryDropped { topic: &'a str, dropped: usize },
    /// A transient read error is being retried.
    ReadRetry {
        error: &'a FrameError,
        attempt: u32,
    },
    /// The receive loop finished.
    Closed { reason: &'a CloseReason },
}

/// Receives [`MuxEvent`]s from a connection's receive task.
///
/// Called inline on the receive task; implementations must not block.
pub trait MuxObserver: Send + Sync + 'static {
    fn on_event(&self, conn_id: &str, event: &MuxEvent<'_>);
}

/// Logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl MuxObserver for TracingObserver {
    fn on_event(&self, conn_id: &str, event: &MuxEvent<'_>) {
        match event {
            MuxEvent::FrameDropped { len, error } => {
                tracing::warn!(conn = conn_id, len, %error, "dropping undecodable frame");
            }
            MuxEvent::UnknownTopic { topic } => {
                tracing::warn!(conn = conn_id, topic, "dropping message for unknown topic");
            }
            MuxEvent::DeliveryDropped { topic, dropped } => {
                tracing::debug!(conn = conn_id, topic, dropped, "subscriber queues full");
            }
            MuxEvent::ReadRetry { error, attempt } => {
                tracing::debug!(conn = conn_id, attempt, %error, "retrying transient read error");
            }
            MuxEvent::Closed { reason } if reason.is_abnormal() => {
                tracing::warn!(conn = conn_id, %reason, "connection closed abnormally");
            }
            MuxEvent::Closed { reason } => {
                tracing::debug!(conn = conn_id, %reason, "connection closed");
            }
        }
    }
}
