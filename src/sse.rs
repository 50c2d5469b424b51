//! Incremental parser for `text/event-stream` bodies.
//!
//! Network chunks can split a frame anywhere, including inside a UTF-8
//! sequence, so bytes are buffered until a full line is available.

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// From `event:`, defaults to "message".
    pub event: String,
    /// `data:` lines joined with newlines.
    pub data: String,
}

const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    event: Option<String>,
    data: String,
    has_data: bool,
    /// Set once the first bytes of the body are known not to be, or to have
    /// been, a byte order mark.
    past_start: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw body bytes and returns every frame completed by them.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        if !self.past_start {
            if self.pending.starts_with(&BOM) {
                self.pending.drain(..BOM.len());
                self.past_start = true;
            } else if !BOM.starts_with(&self.pending) {
                self.past_start = true;
            }
        }

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(rel) = self.pending[start..].iter().position(|b| *b == b'\n' || *b == b'\r') {
            let pos = start + rel;
            let next = if self.pending[pos] == b'\r' {
                match self.pending.get(pos + 1).copied() {
                    Some(b'\n') => pos + 2,
                    Some(_) => pos + 1,
                    // lone CR at the end: wait to see whether LF follows
                    None => break,
                }
            } else {
                pos + 1
            };
            let line = String::from_utf8_lossy(&self.pending[start..pos]).into_owned();
            start = next;
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        self.pending.drain(..start);
        frames
    }

    /// Dispatches whatever is left when the body ends without a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            self.process_line(line.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            // `id` and `retry` are reconnect hints; streams are never resumed
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().filter(|e| !e.is_empty());
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}
