//! Newline framing over a raw byte stream.

use tracing::warn;

/// Longest unterminated frame kept before it is thrown away.
pub const MAX_PARTIAL_FRAME: usize = 4096;

/// Accumulates raw bytes and yields complete newline-terminated frames.
///
/// A partial frame longer than [`MAX_PARTIAL_FRAME`] is discarded along with
/// the rest of its line, so a peer that never sends `\n` cannot grow the
/// buffer without bound.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Dropping input until the end of an oversized line.
    skipping: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mut bytes: &[u8]) {
        if self.skipping {
            match bytes.iter().position(|b| *b == b'\n') {
                Some(end) => {
                    self.skipping = false;
                    bytes = &bytes[end + 1..];
                }
                None => return,
            }
        }
        self.pending.extend_from_slice(bytes);

        let complete = self
            .pending
            .iter()
            .rposition(|b| *b == b'\n')
            .map_or(0, |end| end + 1);
        let partial = self.pending.len() - complete;
        if partial > MAX_PARTIAL_FRAME {
            warn!(
                dropped = partial,
                limit = MAX_PARTIAL_FRAME,
                "unterminated frame too long, discarding"
            );
            self.pending.truncate(complete);
            self.skipping = true;
        }
    }

    /// Pop the next complete frame with trailing whitespace stripped.
    ///
    /// Bytes that are not valid UTF-8 are dropped rather than failing the
    /// frame. Returns `None` until a `\n` has been buffered.
    pub fn next_frame(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let text = String::from_utf8_lossy(&raw[..end]);
        let text: String = text.chars().filter(|c| *c != char::REPLACEMENT_CHARACTER).collect();
        Some(text.trim_end().to_string())
    }

    /// Bytes buffered without a terminating newline yet.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_frame_waits_for_newline() {
        let mut buf = LineBuffer::new();
        buf.push(b"Angle: 1");
        assert_eq!(buf.next_frame(), None);
        buf.push(b"2.5\r\nAng");
        assert_eq!(buf.next_frame().as_deref(), Some("Angle: 12.5"));
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.pending_len(), 3);
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut buf = LineBuffer::new();
        buf.push(b"a\n\nb  \n");
        assert_eq!(buf.next_frame().as_deref(), Some("a"));
        assert_eq!(buf.next_frame().as_deref(), Some(""));
        assert_eq!(buf.next_frame().as_deref(), Some("b"));
        assert_eq!(buf.next_frame(), None);
    }

    #[test]
    fn test_oversized_partial_frame_is_discarded() {
        let mut buf = LineBuffer::new();
        buf.push(b"Angle: 1.0\n");
        buf.push(&vec![b'x'; MAX_PARTIAL_FRAME + 1]);
        assert_eq!(buf.pending_len(), "Angle: 1.0\n".len());

        // The rest of the runaway line is skipped, later frames survive.
        buf.push(&vec![b'y'; 100]);
        buf.push(b"yyy\nAngle: 2.0\n");
        assert_eq!(buf.next_frame().as_deref(), Some("Angle: 1.0"));
        assert_eq!(buf.next_frame().as_deref(), Some("Angle: 2.0"));
        assert_eq!(buf.next_frame(), None);
        assert_eq!(buf.pending_len(), 0);
    }

    #[test]
    fn test_partial_frame_at_limit_is_kept() {
        let mut buf = LineBuffer::new();
        buf.push(&vec![b'7'; MAX_PARTIAL_FRAME]);
        buf.push(b"\n");
        assert_eq!(buf.next_frame().map(|f| f.len()), Some(MAX_PARTIAL_FRAME));
    }

    #[test]
    fn test_invalid_utf8_is_dropped() {
        let mut buf = LineBuffer::new();
        buf.push(b"Angle: \xff4.0\xfe\n");
        assert_eq!(buf.next_frame().as_deref(), Some("Angle: 4.0"));
    }
}
