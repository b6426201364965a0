use std::io::ErrorKind;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::codec::{DelimitedCodec, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `AsyncRead` stream.
///
/// Handles partial reads internally; callers always get complete frames.
/// `read_frame` is cancel-safe: dropping the future loses no buffered bytes.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    codec: DelimitedCodec,
    eof: bool,
}

impl<T: AsyncRead + Unpin> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            codec: DelimitedCodec::with_config(config),
            eof: false,
        }
    }

    /// Read the next complete frame.
    ///
    /// Returns `Ok(None)` once the stream has ended and every buffered byte
    /// has been handed out. Bytes left without a trailing delimiter at end of
    /// stream come back as one last frame.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if self.eof {
                return self.codec.decode_eof(&mut self.buf);
            }

            if let Some(frame) = self.codec.decode(&mut self.buf)? {
                return Ok(Some(frame));
            }

            self.buf.reserve(READ_CHUNK_SIZE);
            match self.inner.read_buf(&mut self.buf).await {
                Ok(0) => {
                    if !self.buf.is_empty() {
                        trace!(buffered = self.buf.len(), "end of stream inside a frame");
                    }
                    self.eof = true;
                }
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Take the next frame already sitting in the buffer, without reading.
    ///
    /// Returns `Ok(None)` when no complete frame is buffered. After end of
    /// stream the unterminated tail counts as a complete frame.
    pub fn try_buffered_frame(&mut self) -> Result<Option<Bytes>> {
        if self.eof {
            self.codec.decode_eof(&mut self.buf)
        } else {
            self.codec.decode(&mut self.buf)
        }
    }

    /// Bytes received but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        self.codec.config()
    }
}
