use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{watch, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument};

use topicmux_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};

use crate::error::{ConnError, Result};
use crate::message::Message;
use crate::observer::{MuxEvent, MuxObserver, TracingObserver};
use crate::registry::TopicRegistry;
use crate::serializer::Serializer;
use crate::topic::{Topic, TopicConfig};

/// Consecutive transient read errors tolerated before the connection gives up.
pub const DEFAULT_MAX_TRANSIENT_READ_ERRORS: u32 = 8;

static NEXT_CONN_ID: AtomicU64 = AtomicU64::new(1);

type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Runtime behavior for a multiplexed connection.
#[derive(Clone)]
pub struct MuxConfig {
    /// Close the connection when no frame arrives within this window.
    /// `None` (the default) disables the deadline.
    pub read_deadline: Option<Duration>,
    /// Restart the deadline after every received frame. Default: `false`,
    /// which makes the deadline a fixed point in time measured from
    /// construction.
    pub refresh_read_deadline: bool,
    /// Consecutive `WouldBlock`/`TimedOut` read errors retried before the
    /// connection closes with [`CloseReason::ReadFailed`].
    pub max_transient_read_errors: u32,
    /// Frame codec settings for both directions.
    pub frame: FrameConfig,
    /// Sink for receive-side diagnostics.
    pub observer: Arc<dyn MuxObserver>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            read_deadline: None,
            refresh_read_deadline: false,
            max_transient_read_errors: DEFAULT_MAX_TRANSIENT_READ_ERRORS,
            frame: FrameConfig::default(),
            observer: Arc::new(TracingObserver),
        }
    }
}

impl MuxConfig {
    /// Set the read deadline. A zero duration disables it.
    pub fn with_read_deadline(mut self, deadline: Duration) -> Self {
        self.read_deadline = (!deadline.is_zero()).then_some(deadline);
        self
    }

    /// Restart the read deadline after every frame.
    pub fn with_refresh_read_deadline(mut self, refresh: bool) -> Self {
        self.refresh_read_deadline = refresh;
        self
    }

    pub fn with_frame_config(mut self, frame: FrameConfig) -> Self {
        self.frame = frame;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn MuxObserver>) -> Self {
        self.observer = observer;
        self
    }
}

impl fmt::Debug for MuxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxConfig")
            .field("read_deadline", &self.read_deadline)
            .field("refresh_read_deadline", &self.refresh_read_deadline)
            .field("max_transient_read_errors", &self.max_transient_read_errors)
            .field("frame", &self.frame)
            .field("observer", &"<dyn MuxObserver>")
            .finish()
    }
}

/// Why a connection's receive loop ended.
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// [`MuxConn::close`] was called or every handle was dropped.
    Requested,
    /// The peer closed its side of the stream.
    Eof,
    /// No frame arrived before the read deadline.
    DeadlineExceeded,
    /// Reading from the stream failed.
    ReadFailed(Arc<FrameError>),
    /// The receive task stopped without recording a reason.
    Aborted,
}

impl CloseReason {
    /// Whether the connection ended for a reason other than a close request
    /// or an orderly end of stream.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Requested | Self::Eof)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("close requested"),
            Self::Eof => f.write_str("end of stream"),
            Self::DeadlineExceeded => f.write_str("read deadline exceeded"),
            Self::ReadFailed(err) => write!(f, "read failed: {err}"),
            Self::Aborted => f.write_str("receive task aborted"),
        }
    }
}

/// Lifecycle of a connection's receive loop.
#[derive(Debug, Clone)]
pub enum ConnState {
    Running,
    Closing,
    Closed(CloseReason),
}

/// One byte stream carrying many named topics.
///
/// Cheap to clone; all clones drive the same connection. Construction spawns
/// the receive task, so it must happen inside a Tokio runtime. The task stops
/// on [`close`](Self::close), on end of stream, on a fatal read error, or when
/// the last handle is dropped.
#[derive(Clone)]
pub struct MuxConn {
    shared: Arc<Shared>,
}

struct Shared {
    id: String,
    serializer: Arc<dyn Serializer>,
    registry: Arc<TopicRegistry>,
    writer: tokio::sync::Mutex<Option<FrameWriter<BoxedWrite>>>,
    shutdown: CancellationToken,
    state: watch::Receiver<ConnState>,
    task: Mutex<Option<JoinHandle<()>>>,
    close_result: OnceCell<std::result::Result<(), Arc<FrameError>>>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MuxConn {
    /// Wrap `stream` with no topics registered yet.
    pub fn new<S>(stream: S, serializer: Arc<dyn Serializer>, config: MuxConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = next_conn_id();
        Self::spawn(id, stream, serializer, config, TopicRegistry::new())
    }

    /// Wrap `stream` with `topics` registered before the first frame is read.
    ///
    /// Frames for topics added later through [`add_topic`](Self::add_topic)
    /// may already have been dropped as unknown.
    pub fn with_topics<S>(
        stream: S,
        serializer: Arc<dyn Serializer>,
        config: MuxConfig,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::from_parts(next_conn_id(), stream, serializer, config, topics)
    }

    /// Build a connection with an explicit id.
    pub fn from_parts<S>(
        id: impl Into<String>,
        stream: S,
        serializer: Arc<dyn Serializer>,
        config: MuxConfig,
        topics: impl IntoIterator<Item = Topic>,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let registry = TopicRegistry::new();
        for topic in topics {
            registry.add(topic)?;
        }
        Ok(Self::spawn(id.into(), stream, serializer, config, registry))
    }

    fn spawn<S>(
        id: String,
        stream: S,
        serializer: Arc<dyn Serializer>,
        config: MuxConfig,
        registry: TopicRegistry,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let registry = Arc::new(registry);
        let shutdown = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnState::Running);
        let writer: BoxedWrite = Box::new(write_half);

        let receiver = ReceiveLoop {
            id: id.clone(),
            reader: FrameReader::with_config(read_half, config.frame.clone()),
            serializer: Arc::clone(&serializer),
            registry: Arc::clone(&registry),
            shutdown: shutdown.clone(),
            state: state_tx,
            config: config.clone(),
        };
        let span = tracing::debug_span!("receive", conn = %id);
        let task = tokio::spawn(receiver.run().instrument(span));
        debug!(conn = %id, serializer = serializer.name(), "connection started");

        Self {
            shared: Arc::new(Shared {
                id,
                serializer,
                registry,
                writer: tokio::sync::Mutex::new(Some(FrameWriter::with_config(
                    writer,
                    config.frame,
                ))),
                shutdown,
                state: state_rx,
                task: Mutex::new(Some(task)),
                close_result: OnceCell::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// Register `topic`. Fails if the name is already taken or the topic
    /// already serves another connection.
    pub fn add_topic(&self, topic: &Topic) -> Result<()> {
        self.shared.registry.add(topic.clone())?;
        debug!(conn = %self.shared.id, topic = topic.name(), "topic added");
        Ok(())
    }

    /// Create a topic named `name`, register it and return its handle.
    pub fn register_topic(&self, name: impl Into<String>) -> Result<Topic> {
        self.register_topic_with_config(name, TopicConfig::default())
    }

    pub fn register_topic_with_config(
        &self,
        name: impl Into<String>,
        config: TopicConfig,
    ) -> Result<Topic> {
        let topic = Topic::with_config(name, config);
        self.add_topic(&topic)?;
        Ok(topic)
    }

    /// Look up a registered topic.
    pub fn topic(&self, name: &str) -> Option<Topic> {
        self.shared.registry.get(name)
    }

    /// Registered topic names, sorted.
    pub fn topic_names(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    /// Encode `message` and write it as one frame.
    ///
    /// Concurrent publishers are serialized; frames never interleave. Nothing
    /// is written when encoding fails. Once a write has stopped part way
    /// through a frame, every later publish fails with [`ConnError::Closed`].
    pub async fn publish(&self, message: &Message) -> Result<()> {
        if self.is_closed() {
            return Err(ConnError::Closed);
        }
        let encoded = self
            .shared
            .serializer
            .serialize(message)
            .map_err(ConnError::Encode)?;

        let send = async {
            let mut writer = self.shared.writer.lock().await;
            match writer.as_mut() {
                // A half-written frame is on the wire; anything appended would be garbage.
                Some(writer) if writer.is_poisoned() => Err(ConnError::Closed),
                Some(writer) => {
                    let sent = writer.send(&encoded).await;
                    if writer.is_poisoned() {
                        warn!(conn = %self.shared.id, "frame write interrupted; publishing disabled");
                    }
                    sent.map_err(ConnError::from)
                }
                None => Err(ConnError::Closed),
            }
        };
        tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => return Err(ConnError::Closed),
            sent = send => sent?,
        }

        trace!(
            conn = %self.shared.id,
            topic = message.topic(),
            size = encoded.len(),
            "published"
        );
        Ok(())
    }

    /// Publish `body` under `topic`.
    pub async fn publish_to(&self, topic: &str, body: impl Into<Bytes>) -> Result<()> {
        self.publish(&Message::new(topic, body)).await
    }

    /// Stop the receive loop and shut down the stream.
    ///
    /// Every subscriber of every topic observes end-of-stream afterwards.
    /// Safe to call any number of times; later calls return the first result.
    pub async fn close(&self) -> Result<()> {
        let shared = &self.shared;
        let result = shared
            .close_result
            .get_or_init(|| async {
                shared.shutdown.cancel();

                let task = shared
                    .task
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                if let Some(task) = task {
                    if let Err(err) = task.await {
                        warn!(conn = %shared.id, error = %err, "receive task ended abnormally");
                    }
                }

                let writer = shared.writer.lock().await.take();
                match writer {
                    Some(mut writer) => match writer.shutdown().await {
                        Ok(()) => Ok(()),
                        Err(FrameError::Io(err))
                            if err.kind() == std::io::ErrorKind::NotConnected =>
                        {
                            Ok(())
                        }
                        Err(err) => Err(Arc::new(err)),
                    },
                    None => Ok(()),
                }
            })
            .await;

        debug!(conn = %shared.id, ok = result.is_ok(), "connection closed");
        result.clone().map_err(ConnError::Close)
    }

    /// Whether close has been requested or the receive loop has ended.
    pub fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn state(&self) -> ConnState {
        self.shared.state.borrow().clone()
    }

    /// The final reason, once the receive loop has finished.
    pub fn close_reason(&self) -> Option<CloseReason> {
        match &*self.shared.state.borrow() {
            ConnState::Closed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Wait until the receive loop has finished and return why.
    pub async fn closed(&self) -> CloseReason {
        let mut state = self.shared.state.clone();
        let reason = match state
            .wait_for(|s| matches!(s, ConnState::Closed(_)))
            .await
        {
            Ok(current) => match &*current {
                ConnState::Closed(reason) => reason.clone(),
                _ => CloseReason::Aborted,
            },
            Err(_) => CloseReason::Aborted,
        };
        reason
    }
}

impl fmt::Debug for MuxConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MuxConn")
            .field("id", &self.shared.id)
            .field("serializer", &self.shared.serializer.name())
            .field("topics", &self.shared.registry.names())
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

fn next_conn_id() -> String {
    format!("conn-{}", NEXT_CONN_ID.fetch_add(1, Ordering::Relaxed))
}

/// State owned by the spawned receive task.
struct ReceiveLoop<R> {
    id: String,
    reader: FrameReader<R>,
    serializer: Arc<dyn Serializer>,
    registry: Arc<TopicRegistry>,
    shutdown: CancellationToken,
    state: watch::Sender<ConnState>,
    config: MuxConfig,
}

impl<R: AsyncRead + Unpin> ReceiveLoop<R> {
    async fn run(mut self) {
        let reason = self.pump().await;

        self.state.send_replace(ConnState::Closing);
        self.shutdown.cancel();
        let released = self.registry.close_all();
        debug!(%reason, released, "receive loop stopping");

        self.config
            .observer
            .on_event(&self.id, &MuxEvent::Closed { reason: &reason });
        self.state.send_replace(ConnState::Closed(reason));
    }

    async fn pump(&mut self) -> CloseReason {
        let window = self.config.read_deadline.filter(|d| !d.is_zero());
        let mut deadline = window.map(|d| Instant::now() + d);
        let mut transient_errors = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                return CloseReason::Requested;
            }

            // Frames already pulled off the stream are delivered even if the
            // deadline passed while an earlier delivery was blocked.
            let next = match self.reader.try_buffered_frame() {
                Ok(Some(frame)) => Ok(Some(frame)),
                Ok(None) => tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return CloseReason::Requested,
                    _ = sleep_until(deadline) => return CloseReason::DeadlineExceeded,
                    next = self.reader.read_frame() => next,
                },
                Err(err) => Err(err),
            };

            match next {
                Ok(Some(frame)) => {
                    transient_errors = 0;
                    if self.config.refresh_read_deadline {
                        deadline = window.map(|d| Instant::now() + d);
                    }
                    if !self.dispatch(frame).await {
                        return CloseReason::Requested;
                    }
                }
                Ok(None) => return CloseReason::Eof,
                Err(err)
                    if err.is_transient()
                        && transient_errors < self.config.max_transient_read_errors =>
                {
                    transient_errors += 1;
                    self.config.observer.on_event(
                        &self.id,
                        &MuxEvent::ReadRetry {
                            error: &err,
                            attempt: transient_errors,
                        },
                    );
                }
                Err(err) => return CloseReason::ReadFailed(Arc::new(err)),
            }
        }
    }

    /// Decode one frame and fan it out. Returns `false` if close was
    /// requested while delivering.
    async fn dispatch(&mut self, frame: Bytes) -> bool {
        let message = match self.serializer.deserialize(&frame) {
            Ok(message) => message,
            Err(error) => {
                self.config.observer.on_event(
                    &self.id,
                    &MuxEvent::FrameDropped {
                        len: frame.len(),
                        error: &error,
                    },
                );
                return true;
            }
        };

        let Some(topic) = self.registry.get(message.topic()) else {
            self.config.observer.on_event(
                &self.id,
                &MuxEvent::UnknownTopic {
                    topic: message.topic(),
                },
            );
            return true;
        };

        let (_, body) = message.into_parts();
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            delivery = topic.deliver(&body) => {
                if delivery.dropped > 0 {
                    self.config.observer.on_event(
                        &self.id,
                        &MuxEvent::DeliveryDropped {
                            topic: topic.name(),
                            dropped: delivery.dropped,
                        },
                    );
                }
                trace!(topic = topic.name(), delivered = delivery.delivered, "fan-out");
                true
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
