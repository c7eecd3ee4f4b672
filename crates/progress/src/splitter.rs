//! Byte-chunk to line splitting.

/// Longest line kept in the buffer before it is force-flushed.
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Accumulates raw output and yields complete lines.
///
/// Both `\n` and `\r` terminate a line, since progress bars redraw with a
/// bare carriage return. Empty lines are dropped and trailing whitespace is
/// trimmed. Invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the lines it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            if byte == b'\n' || byte == b'\r' {
                if let Some(line) = self.take_line() {
                    lines.push(line);
                }
            } else {
                self.buf.push(byte);
                if self.buf.len() >= MAX_LINE_BYTES
                    && let Some(line) = self.take_overlong()
                {
                    lines.push(line);
                }
            }
        }
        lines
    }

    /// Flushes a trailing partial line at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.take_line()
    }

    /// Number of buffered bytes not yet terminated.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Flushes a full buffer, keeping a trailing partial character for
    /// the next line.
    fn take_overlong(&mut self) -> Option<String> {
        let cut = char_boundary(&self.buf);
        let tail = self.buf.split_off(cut);
        let line = self.take_line();
        self.buf = tail;
        line
    }

    fn take_line(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buf);
        let text = String::from_utf8_lossy(&raw).trim_end().to_string();
        if text.is_empty() { None } else { Some(text) }
    }
}

/// Length of the longest prefix of `buf` that does not end inside a
/// multi-byte UTF-8 sequence.
fn char_boundary(buf: &[u8]) -> usize {
    let len = buf.len();
    for i in (len.saturating_sub(3)..len).rev() {
        let byte = buf[i];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if i > 0 && i + width > len { i } else { len };
    }
    len
}
