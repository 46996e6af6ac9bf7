//! Key transitions arriving from the GUI over TCP.
//!
//! The GUI writes newline-terminated lines; TCP hands them to us in
//! arbitrary chunks. The reader buffers partial lines, maps complete ones
//! to turn directions, and ignores anything it does not recognize. A line
//! already longer than the longest valid keyword cannot become valid, so
//! the reader switches to skip mode until the next newline instead of
//! buffering garbage.

use shared::gui::{parse_key_line, MAX_KEY_LINE_LEN};
use shared::TurnDirection;

/// Incremental parser for the GUI's key lines.
pub struct KeyReader {
    buf: Vec<u8>,
    skipping_invalid: bool,
}

impl KeyReader {
    pub fn new() -> Self {
        KeyReader {
            buf: Vec::new(),
            skipping_invalid: false,
        }
    }

    /// Feeds one chunk of bytes and returns the last direction any
    /// complete line in it selected, if there was one. Later lines win:
    /// only the newest key state matters for the next heartbeat.
    pub fn push(&mut self, bytes: &[u8]) -> Option<TurnDirection> {
        self.buf.extend_from_slice(bytes);

        let mut latest = None;
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=newline).collect();
            if self.skipping_invalid {
                self.skipping_invalid = false;
                continue;
            }
            if let Some(direction) = parse_key_line(&line[..line.len() - 1]) {
                latest = Some(direction);
            }
        }

        if self.buf.len() > MAX_KEY_LINE_LEN {
            self.buf.clear();
            self.skipping_invalid = true;
        }
        latest
    }
}

impl Default for KeyReader {
    fn default() -> Self {
        Self::new()
    }
}
