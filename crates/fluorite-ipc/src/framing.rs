//! Newline-delimited framing
//!
//! Reads arrive in arbitrary pieces: a single read can hold several frames or
//! end mid-frame. [`LineBuffer`] keeps the trailing fragment until its newline
//! shows up. Each byte is scanned once, and a fragment that outgrows the
//! frame limit is dropped up to its newline instead of being buffered.

/// Largest frame either side will buffer
pub const DEFAULT_MAX_FRAME: usize = 8 * 1024 * 1024;

/// One unit produced by [`LineBuffer::push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    /// A frame longer than the limit; `len` is how much was seen before it
    /// was dropped
    Oversized { len: usize },
}

/// Accumulates bytes and yields complete lines
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    max_frame: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_frame(DEFAULT_MAX_FRAME)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            pending: Vec::new(),
            max_frame,
            discarding: false,
        }
    }

    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Append `bytes` and drain every complete frame. Blank lines are
    /// skipped and a trailing `\r` is stripped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let head = &rest[..pos];
            rest = &rest[pos + 1..];

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let len = self.pending.len() + head.len();
            if len > self.max_frame {
                self.pending.clear();
                frames.push(Frame::Oversized { len });
                continue;
            }

            self.pending.extend_from_slice(head);
            if let Some(line) = decode_line(&self.pending) {
                frames.push(Frame::Line(line));
            }
            self.pending.clear();
        }

        if !rest.is_empty() && !self.discarding {
            let len = self.pending.len() + rest.len();
            if len > self.max_frame {
                self.pending = Vec::new();
                self.discarding = true;
                frames.push(Frame::Oversized { len });
            } else {
                self.pending.extend_from_slice(rest);
            }
        }

        frames
    }

    /// Bytes held back waiting for a newline
    pub fn remainder(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.discarding = false;
    }
}

fn decode_line(frame: &[u8]) -> Option<String> {
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
    let line = String::from_utf8_lossy(frame);
    (!line.trim().is_empty()).then(|| line.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(frames: Vec<Frame>) -> Vec<String> {
        frames
            .into_iter()
            .map(|frame| match frame {
                Frame::Line(line) => line,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut buffer = LineBuffer::new();
        let frames = lines(buffer.push(b"{\"a\":1}\n{\"b\":2}\n"));
        assert_eq!(frames, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(buffer.remainder(), 0);
    }

    #[test]
    fn test_split_frame_is_held() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"{\"a\":").is_empty());
        assert_eq!(buffer.remainder(), 5);
        assert_eq!(lines(buffer.push(b"1}\n{\"b\"")), vec!["{\"a\":1}"]);
        assert_eq!(lines(buffer.push(b":2}\n")), vec!["{\"b\":2}"]);
    }

    #[test]
    fn test_blank_lines_and_crlf() {
        let mut buffer = LineBuffer::new();
        assert_eq!(lines(buffer.push(b"\n\r\n  \nping\r\n")), vec!["ping"]);
    }

    #[test]
    fn test_crlf_split_between_reads() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"ping\r").is_empty());
        assert_eq!(lines(buffer.push(b"\n")), vec!["ping"]);
    }

    #[test]
    fn test_clear_drops_fragment() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"partial");
        buffer.clear();
        assert_eq!(lines(buffer.push(b"next\n")), vec!["next"]);
    }

    #[test]
    fn test_unterminated_frame_is_capped() {
        let mut buffer = LineBuffer::with_max_frame(8);
        assert!(buffer.push(b"abcd").is_empty());

        // Crossing the limit reports once and stops buffering
        assert_eq!(buffer.push(b"efghij"), vec![Frame::Oversized { len: 10 }]);
        assert_eq!(buffer.remainder(), 0);
        assert!(buffer.push(&[b'x'; 64]).is_empty());
        assert_eq!(buffer.remainder(), 0);

        // The rest of the long frame is skipped, the next one comes through
        assert_eq!(lines(buffer.push(b"tail\nok\n")), vec!["ok"]);
    }

    #[test]
    fn test_complete_oversized_frame_is_skipped() {
        let mut buffer = LineBuffer::with_max_frame(4);
        let frames = buffer.push(b"toolong\nok\n");
        assert_eq!(
            frames,
            vec![Frame::Oversized { len: 7 }, Frame::Line("ok".to_string())]
        );
    }

    #[test]
    fn test_frame_at_limit_is_kept() {
        let mut buffer = LineBuffer::with_max_frame(4);
        assert!(buffer.push(b"ab").is_empty());
        assert_eq!(lines(buffer.push(b"cd\n")), vec!["abcd"]);
    }
}
