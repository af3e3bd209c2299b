//! Line buffering over the raw shell output stream.
//!
//! The remote shell echoes what the user types, so reassembling its output
//! into lines yields `prompt + typed command` lines that the recognizer can
//! inspect. Escape sequences are stripped with a `vte` parser and echoed
//! backspaces are applied, so the line reads the way it looks on screen.

use memchr::memchr2;
use vte::{Parser, Perform};

/// Accumulates output chunks and yields completed lines.
///
/// `\n`, `\r\n` and a lone `\r` all end a line. A `\r\n` split across two
/// chunks still counts as a single line break.
pub struct LineBuffer {
    parser: Parser,
    text: TextCollector,
    /// Upper bound on a pending line; older bytes are dropped beyond it.
    max_line: usize,
}

impl LineBuffer {
    /// Create a line buffer that keeps at most `max_line` bytes of an
    /// unterminated line.
    pub fn new(max_line: usize) -> Self {
        Self {
            parser: Parser::new(),
            text: TextCollector::default(),
            max_line,
        }
    }

    /// Feed a chunk of raw output, returning every line it completed.
    pub fn feed(&mut self, data: &[u8]) -> Vec<String> {
        self.parser.advance(&mut self.text, data);

        let mut lines = Vec::new();
        let pending = &mut self.text.pending;
        let mut consumed = 0;

        while let Some(pos) = memchr2(b'\r', b'\n', &pending[consumed..]) {
            let end = consumed + pos;
            let byte = pending[end];

            if byte == b'\n' && end == 0 && consumed == 0 && self.text.after_cr {
                // Second half of a CRLF that straddled two chunks.
                self.text.after_cr = false;
                consumed = 1;
                continue;
            }
            self.text.after_cr = false;

            lines.push(String::from_utf8_lossy(&pending[consumed..end]).into_owned());
            consumed = end + 1;

            if byte == b'\r' {
                if pending.get(consumed) == Some(&b'\n') {
                    consumed += 1;
                } else if consumed == pending.len() {
                    self.text.after_cr = true;
                }
            }
        }

        pending.drain(..consumed);
        if pending.len() > self.max_line {
            let excess = pending.len() - self.max_line;
            pending.drain(..excess);
        }
        lines
    }

    /// Text of the line currently being assembled.
    pub fn pending(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.text.pending)
    }

    /// Discard the partial line and any half-parsed escape sequence.
    pub fn clear(&mut self) {
        self.parser = Parser::new();
        self.text = TextCollector::default();
    }

    /// Check if no partial line is pending.
    pub fn is_empty(&self) -> bool {
        self.text.pending.is_empty()
    }
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(4096)
    }
}

/// `vte` performer keeping printable text and line control bytes.
#[derive(Default)]
struct TextCollector {
    pending: Vec<u8>,
    /// The previous chunk ended right after a `\r`.
    after_cr: bool,
}

impl Perform for TextCollector {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.pending
            .extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' | b'\r' => self.pending.push(byte),
            // Backspace: drop the last character (not just the last byte).
            0x08 => {
                if let Some(last) = std::str::from_utf8(&self.pending)
                    .ok()
                    .and_then(|s| s.char_indices().next_back())
                {
                    self.pending.truncate(last.0);
                } else {
                    self.pending.pop();
                }
            }
            b'\t' => self.pending.push(b'\t'),
            _ => {}
        }
    }
}
