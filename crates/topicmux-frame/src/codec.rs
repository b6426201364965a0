use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{FrameError, Result};
use crate::splitter::{find_delimiter, Split, Splitter, DELIMITER};

/// Default maximum frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes, delimiter excluded. Default: 16 MiB.
    ///
    /// Applies to outgoing payloads and to unterminated bytes buffered on read.
    pub max_frame_size: usize,
    /// Refuse to encode payloads that contain the delimiter. Default: `true`.
    ///
    /// With `false` such payloads are written as-is and the peer splits them
    /// at the first embedded `+END`.
    pub reject_embedded_delimiter: bool,
    /// Upper bound for writing one frame. Default: none.
    ///
    /// A timed-out write may leave a partial frame on the wire.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            reject_embedded_delimiter: true,
            write_timeout: None,
        }
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────┬───────────┐
/// │ Payload (any length)     │ "+END"    │
/// │                          │ (4B)      │
/// └──────────────────────────┴───────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut, config: &FrameConfig) -> Result<()> {
    if payload.len() > config.max_frame_size {
        return Err(FrameError::FrameTooLarge {
            size: payload.len(),
            max: config.max_frame_size,
        });
    }
    if config.reject_embedded_delimiter {
        if let Some(offset) = find_delimiter(payload) {
            return Err(FrameError::DelimiterInPayload { offset });
        }
    }
    dst.reserve(payload.len() + DELIMITER.len());
    dst.put_slice(payload);
    dst.put_slice(DELIMITER);
    Ok(())
}

/// `tokio_util` codec for `+END`-terminated frames.
///
/// Usable directly with `FramedRead`/`FramedWrite`; [`crate::FrameReader`] and
/// [`crate::FrameWriter`] wrap it for callers that want a plain async API.
#[derive(Debug, Clone, Default)]
pub struct DelimitedCodec {
    splitter: Splitter,
    config: FrameConfig,
}

impl DelimitedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            splitter: Splitter::new(),
            config,
        }
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn take_frame(&self, src: &mut BytesMut, len: usize, advance: usize) -> Result<Bytes> {
        if len > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: len,
                max: self.config.max_frame_size,
            });
        }
        let frame = src.split_to(len).freeze();
        src.advance(advance - len);
        Ok(frame)
    }
}

impl Decoder for DelimitedCodec {
    type Item = Bytes;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.splitter.split(src, false) {
            Split::Frame { len, advance } => self.take_frame(src, len, advance).map(Some),
            _ => {
                // Up to three trailing bytes may still be a delimiter prefix.
                let limit = self.config.max_frame_size.saturating_add(DELIMITER.len() - 1);
                if src.len() > limit {
                    return Err(FrameError::FrameTooLarge {
                        size: src.len(),
                        max: self.config.max_frame_size,
                    });
                }
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self.splitter.split(src, true) {
            Split::Frame { len, advance } => self.take_frame(src, len, advance).map(Some),
            Split::Final { len } => self.take_frame(src, len, len).map(Some),
            Split::NeedMore | Split::End => Ok(None),
        }
    }
}

impl Encoder<&[u8]> for DelimitedCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<()> {
        encode_frame(item, dst, &self.config)
    }
}

impl Encoder<Bytes> for DelimitedCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        encode_frame(&item, dst, &self.config)
    }
}
