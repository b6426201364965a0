use std::io::ErrorKind;

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `AsyncWrite` stream.
///
/// One `send` writes one whole frame. The writer is not shareable; wrap it in
/// a lock if several tasks publish on the same stream.
///
/// A write that fails, times out or is cancelled part way may leave an
/// unterminated frame on the wire. The writer is poisoned from then on and
/// every later `send` fails with [`FrameError::Poisoned`].
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
    poisoned: bool,
}

impl<T: AsyncWrite + Unpin> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
            poisoned: false,
        }
    }

    /// Encode `payload`, append the delimiter and write the frame.
    ///
    /// Nothing is written when encoding fails.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if self.poisoned {
            return Err(FrameError::Poisoned);
        }
        self.buf.clear();
        encode_frame(payload, &mut self.buf, &self.config)?;

        // Cleared only once the whole frame is out; a dropped future keeps it set.
        self.poisoned = true;
        let result = match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.write_buffered())
                .await
                .map_err(|_| {
                    FrameError::Io(std::io::Error::new(
                        ErrorKind::TimedOut,
                        format!("frame write exceeded {limit:?}"),
                    ))
                })?,
            None => self.write_buffered().await,
        };
        if result.is_ok() {
            self.poisoned = false;
        }
        result
    }

    /// Whether an earlier write stopped part way through a frame.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    async fn write_buffered(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush().await
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Flush and shut down the write direction of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(FrameError::Io)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;

    use super::*;
    use crate::reader::FrameReader;

    #[tokio::test]
    async fn write_single_frame() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());
        writer.send(b"hello").await.unwrap();

        assert_eq!(writer.into_inner(), b"hello+END".to_vec());
    }

    #[tokio::test]
    async fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());
        writer.send(b"one").await.unwrap();
        writer.send(b"two").await.unwrap();
        writer.send(b"three").await.unwrap();

        let wire = writer.into_inner();
        let mut reader = FrameReader::new(wire.as_slice());
        assert_eq!(reader.read_frame().await.unwrap().unwrap().as_ref(), b"one");
        assert_eq!(reader.read_frame().await.unwrap().unwrap().as_ref(), b"two");
        assert_eq!(reader.read_frame().await.unwrap().unwrap().as_ref(), b"three");
    }

    #[tokio::test]
    async fn payload_too_large_rejected() {
        let cfg = FrameConfig {
            max_frame_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Vec::<u8>::new(), cfg);

        let err = writer.send(b"oversized").await.unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { .. }));
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn embedded_delimiter_rejected_without_writing() {
        let mut writer = FrameWriter::new(Vec::<u8>::new());

        let err = writer.send(b"woof+END").await.unwrap_err();
        assert!(matches!(err, FrameError::DelimiterInPayload { offset: 4 }));
        assert!(writer.get_ref().is_empty());
    }

    #[tokio::test]
    async fn partial_writes_are_completed() {
        let mut mock = tokio_test::io::Builder::new()
            .write(b"hel")
            .write(b"lo+END")
            .build();
        let mut writer = FrameWriter::new(&mut mock);

        writer.send(b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn write_error_propagates() {
        let mut mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::from(ErrorKind::BrokenPipe))
            .build();
        let mut writer = FrameWriter::new(&mut mock);

        let err = writer.send(b"x").await.unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[tokio::test]
    async fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(b"x").await.unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[tokio::test]
    async fn write_timeout_reports_timed_out() {
        let cfg = FrameConfig {
            write_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        // Nobody reads the other end, so the small duplex buffer fills up.
        let (left, _right) = tokio::io::duplex(8);
        let mut writer = FrameWriter::with_config(left, cfg);

        let err = writer.send(&[b'x'; 64]).await.unwrap_err();
        assert!(err.is_transient());
        assert!(writer.is_poisoned());

        // The peer already holds a fragment; appending another frame would corrupt it.
        let err = writer.send(b"ok").await.unwrap_err();
        assert!(matches!(err, FrameError::Poisoned));
    }

    #[tokio::test]
    async fn rejected_payload_does_not_poison() {
        let mut writer = FrameWriter::new(Vec::new());
        assert!(writer.send(b"a+ENDb").await.is_err());
        assert!(!writer.is_poisoned());
        writer.send(b"ok").await.unwrap();
        assert_eq!(writer.get_ref().as_slice(), b"ok+END");
    }

    #[tokio::test]
    async fn failed_write_poisons() {
        let mut writer = FrameWriter::new(ZeroWriter);
        assert!(matches!(
            writer.send(b"x").await,
            Err(FrameError::ConnectionClosed)
        ));
        assert!(matches!(writer.send(b"y").await, Err(FrameError::Poisoned)));
    }

    struct ZeroWriter;

    impl AsyncWrite for ZeroWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Ok(0))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }
}
