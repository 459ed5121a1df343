use bytes::Bytes;
use serde::Serialize;

/// Literal terminator frame closing every outbound stream.
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Serializes a payload as a single `data:` frame.
pub fn data_frame<T: Serialize>(payload: &T) -> Bytes {
    match serde_json::to_string(payload) {
        Ok(json) => Bytes::from(format!("data: {json}\n\n")),
        Err(_) => Bytes::from_static(b""),
    }
}

pub fn done_frame() -> Bytes {
    Bytes::from_static(DONE_FRAME.as_bytes())
}

/// One parsed server-sent event from the upstream gateway.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE parser. Feed it arbitrary byte chunks; it yields
/// complete events as blank-line separators arrive and keeps partial
/// lines buffered across calls.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, chunk: &Bytes) -> Vec<SseEvent> {
        match std::str::from_utf8(chunk) {
            Ok(text) => self.push_str(text),
            Err(_) => Vec::new(),
        }
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find('\n') {
            let mut line = self.buffer[..pos].to_string();
            self.buffer.drain(..=pos);
            if line.ends_with('\r') {
                line.pop();
            }
            if line.is_empty() {
                self.flush_event(&mut events);
            } else {
                self.consume_line(&line);
            }
        }

        events
    }

    /// Flushes whatever is still buffered once the upstream closes.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.ends_with('\r') {
                line.pop();
            }
            self.consume_line(&line);
        }
        let mut events = Vec::new();
        self.flush_event(&mut events);
        events
    }

    fn consume_line(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = field_value(line, "event") {
            self.event = if value.is_empty() {
                None
            } else {
                Some(value.to_string())
            };
        } else if let Some(value) = field_value(line, "data") {
            self.data_lines.push(value.to_string());
        }
    }

    fn flush_event(&mut self, events: &mut Vec<SseEvent>) {
        if self.event.is_none() && self.data_lines.is_empty() {
            return;
        }
        events.push(SseEvent {
            event: self.event.take(),
            data: self.data_lines.join("\n"),
        });
        self.data_lines.clear();
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    if line == field {
        return Some("");
    }
    line.strip_prefix(field)?
        .strip_prefix(':')
        .map(|value| value.trim_start())
}
