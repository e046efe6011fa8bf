//! Pattern buffer with tail-search optimization.
//!
//! Only the last N bytes of the buffer are searched for prompt patterns,
//! rather than the entire output. Long `show` outputs stay cheap to scan.

use regex::bytes::Regex;
use vte::{Parser, Perform};

/// Buffer for accumulating terminal output and searching for prompts.
///
/// Incoming bytes pass through a VT parser so escape sequences are
/// dropped before they can break a prompt match. The parser keeps its
/// state between chunks, so an escape sequence split over two reads is
/// still removed.
pub struct PatternBuffer {
    /// The accumulated, cleaned output.
    buffer: Vec<u8>,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,

    parser: Parser,
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sink = PlainText {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut sink, data);
    }

    /// Search only the tail of the buffer for the pattern.
    ///
    /// Returns the match end as an offset into the full buffer.
    pub fn search_tail(&self, pattern: &Regex) -> Option<usize> {
        let start = self.buffer.len().saturating_sub(self.search_depth);
        pattern.find(&self.buffer[start..]).map(|m| start + m.end())
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

/// Keeps printable text and line control, drops everything else.
struct PlainText<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for PlainText<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out
            .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.out.push(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extend() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"Hello, world!");
        assert_eq!(buffer.as_slice(), b"Hello, world!");
    }

    #[test]
    fn test_ansi_stripping() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"\x1b[32mGreen text\x1b[0m\r\n");
        assert_eq!(buffer.as_slice(), b"Green text\r\n");
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"router\x1b[");
        buffer.extend(b"0m#");
        assert_eq!(buffer.as_slice(), b"router#");
    }

    #[test]
    fn test_bell_and_backspace_dropped() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"ab\x07\x08c");
        assert_eq!(buffer.as_slice(), b"abc");
    }

    #[test]
    fn test_tail_search() {
        let mut buffer = PatternBuffer::new(20);
        buffer.extend(&[b'x'; 100]);
        buffer.extend(b"\nrouter#");

        let pattern = Regex::new(r"router#").unwrap();
        assert_eq!(buffer.search_tail(&pattern), Some(108));
    }

    #[test]
    fn test_tail_search_not_in_tail() {
        let mut buffer = PatternBuffer::new(10);
        buffer.extend(b"router#");
        buffer.extend(&[b'x'; 100]);

        let pattern = Regex::new(r"router#").unwrap();
        assert!(buffer.search_tail(&pattern).is_none());
    }

    #[test]
    fn test_take_clears_buffer() {
        let mut buffer = PatternBuffer::new(100);
        buffer.extend(b"test data");
        assert_eq!(buffer.take(), b"test data");
        assert!(buffer.is_empty());
    }
}
