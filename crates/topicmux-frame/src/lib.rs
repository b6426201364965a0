//! Delimiter-terminated message framing for topicmux.
//!
//! Every message on the wire is the encoded message bytes followed by the
//! four ASCII bytes `+END`. The delimiter is not escaped and frames carry no
//! length prefix, so a payload that itself contains `+END` would be split
//! early on the receiving side. The encoder refuses such payloads by default
//! (see [`FrameConfig::reject_embedded_delimiter`]).
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod splitter;
pub mod writer;

pub use codec::{encode_frame, DelimitedCodec, FrameConfig, DEFAULT_MAX_FRAME_SIZE};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use splitter::{find_delimiter, split, Split, Splitter, DELIMITER};
pub use writer::FrameWriter;
