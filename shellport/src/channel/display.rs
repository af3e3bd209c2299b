//! The local terminal display.
//!
//! Two logical writers share the display: raw pass-through of remote output
//! and status lines produced by local file transfers. Exactly one of them
//! holds the writer token at a time; writes from the other are refused.

use std::io::{self, Write};

use log::trace;

/// The writer currently allowed to use the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Writer {
    /// Remote output is forwarded to the display as it arrives.
    Passthrough,

    /// Local status lines are written; remote output is held back.
    Status,
}

/// Single-owner output sink shared by pass-through and status reporting.
pub struct Display<W: Write> {
    sink: W,
    owner: Writer,
}

impl<W: Write> Display<W> {
    /// Create a display owned by the pass-through writer.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            owner: Writer::Passthrough,
        }
    }

    /// Hand the writer token to `to`, returning the previous owner.
    pub fn handover(&mut self, to: Writer) -> Writer {
        let previous = std::mem::replace(&mut self.owner, to);
        trace!("display token {:?} -> {:?}", previous, to);
        previous
    }

    /// Current owner of the writer token.
    pub fn owner(&self) -> Writer {
        self.owner
    }

    /// Forward raw remote output.
    ///
    /// Returns `Ok(false)` without writing if pass-through does not hold the token.
    pub fn passthrough(&mut self, data: &[u8]) -> io::Result<bool> {
        if self.owner != Writer::Passthrough {
            trace!("refused {} pass-through bytes while detached", data.len());
            return Ok(false);
        }
        self.sink.write_all(data)?;
        self.sink.flush()?;
        Ok(true)
    }

    /// Write one status line.
    ///
    /// The local terminal runs in raw mode, so lines end with `\r\n`.
    /// Returns `Ok(false)` without writing if status does not hold the token.
    pub fn status(&mut self, line: &str) -> io::Result<bool> {
        if self.owner != Writer::Status {
            trace!("refused status line while piped: {:?}", line);
            return Ok(false);
        }
        self.sink.write_all(line.as_bytes())?;
        self.sink.write_all(b"\r\n")?;
        self.sink.flush()?;
        Ok(true)
    }

    /// Get a reference to the underlying sink.
    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Consume the display, returning the sink.
    pub fn into_inner(self) -> W {
        self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_piped() {
        let mut display = Display::new(Vec::new());
        assert_eq!(display.owner(), Writer::Passthrough);
        assert!(display.passthrough(b"remote bytes").unwrap());
        assert_eq!(display.sink().as_slice(), b"remote bytes");
    }

    #[test]
    fn test_status_refused_while_piped() {
        let mut display = Display::new(Vec::new());
        assert!(!display.status("Downloading").unwrap());
        assert!(display.sink().is_empty());
    }

    #[test]
    fn test_passthrough_refused_while_detached() {
        let mut display = Display::new(Vec::new());
        assert_eq!(display.handover(Writer::Status), Writer::Passthrough);
        assert!(!display.passthrough(b"noise").unwrap());
        assert!(display.status("File is uploaded successfully").unwrap());
        assert_eq!(
            display.into_inner(),
            b"File is uploaded successfully\r\n".to_vec()
        );
    }

    #[test]
    fn test_handover_back() {
        let mut display = Display::new(Vec::new());
        display.handover(Writer::Status);
        assert_eq!(display.handover(Writer::Passthrough), Writer::Status);
        assert!(display.passthrough(b"$ ").unwrap());
    }
}
