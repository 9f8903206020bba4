/// Splits a byte stream into text lines.
///
/// Lines are terminated by CR and/or LF; empty lines are skipped. A line longer
/// than [`LineSplitter::MAX_LINE`] is discarded up to its terminator, because a
/// truncated sentence would only fail the checksum anyway.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
    /// Set after an overflow until the next terminator.
    discarding: bool,
}

impl LineSplitter {
    /// Maximum length of a single line in bytes.
    pub const MAX_LINE: usize = 256;

    pub fn new() -> Self {
        Self { buffer: Vec::with_capacity(Self::MAX_LINE), discarding: false }
    }

    /// Drops any partial line.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feeds `data` and calls `on_line` for every completed line.
    pub fn feed<F>(&mut self, data: &[u8], mut on_line: F)
    where F: FnMut(&str) {
        for &byte in data {
            if byte == b'\n' || byte == b'\r' {
                if !self.discarding && !self.buffer.is_empty() {
                    let line = String::from_utf8_lossy(&self.buffer);
                    on_line(line.trim());
                }
                self.buffer.clear();
                self.discarding = false;
            } else if self.discarding {
                continue;
            } else if self.buffer.len() >= Self::MAX_LINE {
                self.buffer.clear();
                self.discarding = true;
            } else {
                self.buffer.push(byte);
            }
        }
    }
}
