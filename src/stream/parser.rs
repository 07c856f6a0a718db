//! Incremental parser for agent push streams
//!
//! Bytes are buffered until a newline completes a line, so chunk boundaries
//! (including ones that split a UTF-8 sequence) never change the result.
//! A blank line ends a block and dispatches one event built from the most
//! recently declared `event:` name and the block's `data:` payload.

use crate::codec::AgentStreamEvent;
use serde_json::Value;

/// Incremental `event:/data:` stream parser
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no newline
    scanned: usize,
    event_name: Option<String>,
    data_lines: Vec<String>,
    dropped: usize,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed arbitrary bytes and drain every event they complete
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<AgentStreamEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            let mut line = &self.buffer[start..end];
            if let Some(stripped) = line.strip_suffix(b"\r") {
                line = stripped;
            }
            let line = String::from_utf8_lossy(line).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            start = end + 1;
            search_from = start;
        }

        // Compact once; what remains is a partial line
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        events
    }

    /// Signal end of stream, flushing a trailing line and an unterminated block
    pub fn close(&mut self) -> Vec<AgentStreamEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.scanned = 0;
            let line = String::from_utf8_lossy(&rest);
            let line = line.trim_end_matches('\r').to_string();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        if let Some(event) = self.dispatch() {
            events.push(event);
        }
        events
    }

    /// Parse a complete payload in one shot
    pub fn parse_all(input: &[u8]) -> Vec<AgentStreamEvent> {
        let mut parser = Self::new();
        let mut events = parser.feed(input);
        events.extend(parser.close());
        events
    }

    /// Number of malformed blocks dropped so far
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// True when no partial line or block is pending
    pub fn is_idle(&self) -> bool {
        self.buffer.is_empty() && self.data_lines.is_empty()
    }

    fn process_line(&mut self, line: &str) -> Option<AgentStreamEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // comment / keep-alive
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_name = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<AgentStreamEvent> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();

        let kind = self.event_name.as_deref().unwrap_or("message");
        let data: Value = match serde_json::from_str(&payload) {
            Ok(data) => data,
            Err(e) => {
                self.dropped += 1;
                tracing::debug!(kind = kind, "Dropping malformed event payload: {}", e);
                return None;
            }
        };

        let event = AgentStreamEvent::from_parts(kind, &data);
        if event.is_none() {
            self.dropped += 1;
            tracing::debug!(kind = kind, "Dropping unrecognized event");
        }
        event
    }
}
