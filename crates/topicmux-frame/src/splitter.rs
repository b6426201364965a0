//! Delimiter scanning.
//!
//! The splitter turns a growing buffer of unconsumed bytes into frame
//! boundaries. It tracks how far into `+END` the scan has matched, one byte at
//! a time, and never looks back: bytes already scanned are not rescanned when
//! more data arrives.

/// Frame terminator appended after every encoded message.
pub const DELIMITER: &[u8; 4] = b"+END";

/// Outcome of scanning a buffer for the next frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    /// A delimiter was found. The frame is `buf[..len]`; discard `advance`
    /// bytes (frame plus delimiter) from the front of the buffer.
    Frame { len: usize, advance: usize },
    /// No delimiter yet and the input is not exhausted.
    NeedMore,
    /// Input is exhausted and `len` leftover bytes remain; emit them as the
    /// final frame. Trailing partial delimiter bytes are part of that frame.
    Final { len: usize },
    /// Input is exhausted and nothing is buffered.
    End,
}

/// Scan `data` from the start.
///
/// Stateless convenience over [`Splitter::split`].
pub fn split(data: &[u8], at_eof: bool) -> Split {
    Splitter::new().split(data, at_eof)
}

/// Offset of the first delimiter in `data`, if any.
pub fn find_delimiter(data: &[u8]) -> Option<usize> {
    match split(data, false) {
        Split::Frame { len, .. } => Some(len),
        _ => None,
    }
}

/// Resumable delimiter scanner.
///
/// Between calls the caller may only append to the buffer, or drop exactly
/// the `advance` bytes reported by a [`Split::Frame`]. Any other mutation
/// requires [`Splitter::reset`].
#[derive(Debug, Default, Clone)]
pub struct Splitter {
    /// Bytes of the current buffer already scanned.
    scanned: usize,
    /// How many bytes of `DELIMITER` the scan currently sits on.
    matched: usize,
}

impl Splitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan for the next frame boundary.
    pub fn split(&mut self, data: &[u8], at_eof: bool) -> Split {
        if self.scanned > data.len() {
            self.reset();
        }

        while self.scanned < data.len() {
            self.matched = advance_match(self.matched, data[self.scanned]);
            self.scanned += 1;

            if self.matched == DELIMITER.len() {
                let advance = self.scanned;
                self.reset();
                return Split::Frame {
                    len: advance - DELIMITER.len(),
                    advance,
                };
            }
        }

        if !at_eof {
            return Split::NeedMore;
        }

        self.reset();
        if data.is_empty() {
            Split::End
        } else {
            Split::Final { len: data.len() }
        }
    }

    /// Number of buffered bytes already scanned without finding a delimiter.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Forget all scan progress.
    pub fn reset(&mut self) {
        self.scanned = 0;
        self.matched = 0;
    }
}

fn advance_match(matched: usize, byte: u8) -> usize {
    if byte == DELIMITER[matched] {
        matched + 1
    } else if byte == DELIMITER[0] {
        // '+' occurs only at the head of the delimiter, so a mismatch can
        // only restart the run on a fresh '+'.
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_frame_before_delimiter() {
        assert_eq!(
            split(b"hello+ENDrest", false),
            Split::Frame { len: 5, advance: 9 }
        );
    }

    #[test]
    fn empty_frame() {
        assert_eq!(split(b"+END", false), Split::Frame { len: 0, advance: 4 });
    }

    #[test]
    fn needs_more_without_delimiter() {
        assert_eq!(split(b"hello", false), Split::NeedMore);
        assert_eq!(split(b"hello+EN", false), Split::NeedMore);
        assert_eq!(split(b"", false), Split::NeedMore);
    }

    #[test]
    fn end_of_input_flushes_remaining() {
        assert_eq!(split(b"tail", true), Split::Final { len: 4 });
        assert_eq!(split(b"", true), Split::End);
    }

    #[test]
    fn partial_delimiter_at_eof_is_data() {
        assert_eq!(split(b"abc+EN", true), Split::Final { len: 6 });
    }

    #[test]
    fn complete_frame_wins_over_eof() {
        assert_eq!(
            split(b"one+ENDtwo", true),
            Split::Frame { len: 3, advance: 7 }
        );
    }

    #[test]
    fn restarts_run_on_repeated_plus() {
        assert_eq!(split(b"a++END", false), Split::Frame { len: 2, advance: 6 });
        assert_eq!(split(b"+E+END", false), Split::Frame { len: 2, advance: 6 });
        assert_eq!(split(b"+EN+END", false), Split::Frame { len: 3, advance: 7 });
    }

    #[test]
    fn near_misses_are_not_boundaries() {
        assert_eq!(split(b"+EXD +ED END", false), Split::NeedMore);
    }

    #[test]
    fn embedded_delimiter_splits_early() {
        // No escaping: a payload carrying the delimiter is cut at its first occurrence.
        let wire = b"body with +END inside+END";
        assert_eq!(split(wire, false), Split::Frame { len: 10, advance: 14 });
        assert_eq!(find_delimiter(b"body with +END inside"), Some(10));
    }

    #[test]
    fn resumes_across_appends() {
        let mut splitter = Splitter::new();
        let mut buf = b"payload+E".to_vec();
        assert_eq!(splitter.split(&buf, false), Split::NeedMore);
        assert_eq!(splitter.scanned(), buf.len());

        buf.extend_from_slice(b"ND");
        assert_eq!(
            splitter.split(&buf, false),
            Split::Frame { len: 7, advance: 11 }
        );
        assert_eq!(splitter.scanned(), 0);
    }

    #[test]
    fn one_byte_at_a_time() {
        let wire = b"ab+ENDcd+END";
        let mut splitter = Splitter::new();
        let mut buf = Vec::new();
        let mut frames = Vec::new();

        for &byte in wire {
            buf.push(byte);
            if let Split::Frame { len, advance } = splitter.split(&buf, false) {
                frames.push(buf[..len].to_vec());
                buf.drain(..advance);
            }
        }

        assert_eq!(frames, vec![b"ab".to_vec(), b"cd".to_vec()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn reset_when_buffer_shrinks() {
        let mut splitter = Splitter::new();
        assert_eq!(splitter.split(b"long buffer", false), Split::NeedMore);
        assert_eq!(splitter.split(b"x+END", false), Split::Frame { len: 1, advance: 5 });
    }
}
