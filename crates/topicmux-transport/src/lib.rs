//! Async byte-stream endpoints for topicmux.
//!
//! The multiplexer itself works over any connected duplex stream. This crate
//! supplies the common ones so callers do not have to:
//! - TCP (`tcp://host:port`)
//! - Unix domain sockets (`unix:/path/to.sock`, Linux/macOS)
//!
//! Everything else builds on the [`MuxStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::Listener;
pub use stream::{connect, MuxStream};
