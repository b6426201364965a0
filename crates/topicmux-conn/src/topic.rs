use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

/// What the receive loop does when a subscriber's queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait until the subscriber makes room.
    ///
    /// A subscriber that stops draining stalls demultiplexing for the whole
    /// connection, not just its own topic.
    #[default]
    Block,
    /// Drop the incoming body for that subscriber and move on.
    DropNewest,
}

/// Per-topic delivery settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicConfig {
    /// Per-subscriber queue length. Default: 1. Zero is raised to 1.
    pub capacity: usize,
    /// Behavior when a subscriber queue is full. Default: [`OverflowPolicy::Block`].
    pub overflow: OverflowPolicy,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            overflow: OverflowPolicy::Block,
        }
    }
}

/// Outcome of fanning one body out to a topic's subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that accepted the body.
    pub delivered: usize,
    /// Subscribers whose full queue made the body be dropped.
    pub dropped: usize,
    /// Subscribers that had gone away.
    pub gone: usize,
}

/// A named fan-out point.
///
/// Cheap to clone; clones share the same subscriber list. Subscribers can join
/// at any time and are only released when the owning connection closes.
/// A topic serves a single connection: once attached it cannot be registered
/// anywhere else, even after that connection has closed.
#[derive(Clone)]
pub struct Topic {
    inner: Arc<TopicInner>,
}

struct TopicInner {
    name: String,
    config: TopicConfig,
    sinks: Mutex<Sinks>,
}

#[derive(Default)]
struct Sinks {
    senders: Vec<mpsc::Sender<Bytes>>,
    attached: bool,
    closed: bool,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, TopicConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: TopicConfig) -> Self {
        let config = TopicConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            inner: Arc::new(TopicInner {
                name: name.into(),
                config,
                sinks: Mutex::new(Sinks::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &TopicConfig {
        &self.inner.config
    }

    /// Register a new subscriber. Never blocks.
    ///
    /// Subscribing to a topic whose connection has already closed returns a
    /// subscription that ends immediately.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.config.capacity);
        let mut sinks = self.lock_sinks();
        if !sinks.closed {
            sinks.senders.push(tx);
        }
        Subscription {
            topic: self.inner.name.clone(),
            rx,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.lock_sinks().senders.len()
    }

    /// Whether the owning connection has released this topic.
    pub fn is_closed(&self) -> bool {
        self.lock_sinks().closed
    }

    /// Whether a connection has taken this topic.
    pub fn is_attached(&self) -> bool {
        self.lock_sinks().attached
    }

    /// Claim the topic for one connection. Fails if it was claimed before.
    pub(crate) fn attach(&self) -> bool {
        let mut sinks = self.lock_sinks();
        if sinks.attached || sinks.closed {
            return false;
        }
        sinks.attached = true;
        true
    }

    /// Hand `body` to every current subscriber in registration order.
    ///
    /// The subscriber list is snapshotted first; the lock is never held while
    /// waiting on a subscriber.
    pub(crate) async fn deliver(&self, body: &Bytes) -> Delivery {
        let senders = {
            let sinks = self.lock_sinks();
            if sinks.closed {
                return Delivery::default();
            }
            sinks.senders.clone()
        };

        let mut delivery = Delivery::default();
        for sender in &senders {
            match self.inner.config.overflow {
                OverflowPolicy::Block => match sender.send(body.clone()).await {
                    Ok(()) => delivery.delivered += 1,
                    Err(_) => delivery.gone += 1,
                },
                OverflowPolicy::DropNewest => match sender.try_send(body.clone()) {
                    Ok(()) => delivery.delivered += 1,
                    Err(TrySendError::Full(_)) => delivery.dropped += 1,
                    Err(TrySendError::Closed(_)) => delivery.gone += 1,
                },
            }
        }

        if delivery.gone > 0 {
            self.lock_sinks().senders.retain(|s| !s.is_closed());
        }
        delivery
    }

    /// Release every subscriber; they observe end-of-stream once their queues
    /// are drained. Returns how many were released.
    pub(crate) fn close(&self) -> usize {
        let mut sinks = self.lock_sinks();
        sinks.closed = true;
        let released = sinks.senders.len();
        sinks.senders.clear();
        released
    }

    fn lock_sinks(&self) -> MutexGuard<'_, Sinks> {
        self.inner
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks = self.lock_sinks();
        f.debug_struct("Topic")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("subscribers", &sinks.senders.len())
            .field("attached", &sinks.attached)
            .field("closed", &sinks.closed)
            .finish()
    }
}

/// Receiving end of one subscription.
///
/// Yields message bodies in stream order and `None` once the connection has
/// closed and everything already queued has been received.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    /// Name of the subscribed topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next body.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a queued body without waiting.
    pub fn try_recv(&mut self) -> Result<Bytes, mpsc::error::TryRecvError> {
        self.rx.try_recv()
    }
}

impl futures_core::Stream for Subscription {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
