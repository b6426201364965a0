//! Topic-multiplexed connections.
//!
//! A [`MuxConn`] owns one byte stream and carries any number of named topics
//! over it. The sending side publishes [`Message`]s tagged with a topic name;
//! the receiving side runs one background task that splits the stream into
//! frames, decodes them with the configured [`Serializer`] and fans each body
//! out to every local [`Subscription`] of the matching [`Topic`].
//!
//! Fire-and-forget only: there are no acknowledgements and no delivery
//! guarantee beyond "handed to the subscribers present while the connection
//! was open".

pub mod conn;
pub mod connector;
pub mod error;
pub mod listener;
pub mod message;
pub mod observer;
pub mod registry;
pub mod serializer;
pub mod topic;

pub use conn::{CloseReason, ConnState, MuxConfig, MuxConn, DEFAULT_MAX_TRANSIENT_READ_ERRORS};
pub use connector::{dial, dial_with_topics};
pub use error::{ConnError, Result};
pub use listener::MuxListener;
pub use message::Message;
pub use observer::{MuxEvent, MuxObserver, TracingObserver};
pub use registry::TopicRegistry;
pub use serializer::{BinarySerializer, JsonSerializer, SerializeError, Serializer};
pub use topic::{Delivery, OverflowPolicy, Subscription, Topic, TopicConfig};
