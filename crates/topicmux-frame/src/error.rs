use std::io::ErrorKind;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame (or the unterminated bytes buffered so far) exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload contains the frame delimiter and would be split early by the peer.
    #[error("payload contains the frame delimiter \"+END\" at offset {offset}")]
    DelimiterInPayload { offset: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream stopped accepting bytes in the middle of a frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// An earlier write stopped part way through a frame; the stream is unusable.
    #[error("writer poisoned by an interrupted frame write")]
    Poisoned,
}

impl FrameError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Only read/write stalls qualify; a corrupted or closed stream never does.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FrameError::Io(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
