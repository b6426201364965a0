//! Named topic streams multiplexed over one byte-stream connection.
//!
//! One side publishes messages tagged with a topic name; the other side splits
//! the incoming bytes back into messages and fans each one out to every local
//! subscriber of that topic.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix domain socket endpoints
//! - [`frame`]: `+END`-delimited framing
//! - [`conn`]: topics, subscriptions and the multiplexed connection (behind `conn` feature)

/// Re-export transport types.
pub mod transport {
    pub use topicmux_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use topicmux_frame::*;
}

/// Re-export connection types (requires `conn` feature).
#[cfg(feature = "conn")]
pub mod conn {
    pub use topicmux_conn::*;
}
