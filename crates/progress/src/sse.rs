//! Line-buffering Server-Sent Events decoder.
//!
//! TCP chunk boundaries do not line up with SSE event boundaries, so
//! partial lines are held as raw bytes until their newline arrives and
//! only complete lines are decoded as UTF-8. An event is
//! dispatched on the blank line that terminates it; multiple `data:`
//! lines inside one event are joined with `\n`.

use std::mem;

/// Accumulates raw bytes and yields complete `data` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes received after the last newline.
    line: Vec<u8>,
    /// `data:` lines of the event currently being assembled.
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every event it completed.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.line.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(newline) = self.line.iter().position(|&b| b == b'\n') {
            let rest = self.line.split_off(newline + 1);
            let raw = mem::replace(&mut self.line, rest);
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
                continue;
            }

            // Comment lines keep intermediaries from closing idle streams.
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
            // `event`, `id` and `retry` carry nothing the progress payload needs.
        }

        events
    }

    /// Emit a trailing event the server did not terminate with a blank line.
    pub fn finish(&mut self) -> Option<String> {
        let raw = mem::take(&mut self.line);
        let remaining = String::from_utf8_lossy(&raw);
        if let Some(value) = remaining.trim_end_matches('\r').strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: {\"progress\":10}\n\n");
        assert_eq!(events, vec![r#"{"progress":10}"#]);
    }

    #[test]
    fn event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"progre").is_empty());
        assert!(decoder.feed(b"ss\":20}\n").is_empty());
        let events = decoder.feed(b"\n");
        assert_eq!(events, vec![r#"{"progress":20}"#]);
    }

    #[test]
    fn several_events_in_one_chunk() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: a\n\ndata: b\r\n\r\n");
        assert_eq!(events, vec!["a", "b"]);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: first\ndata: second\n\n");
        assert_eq!(events, vec!["first\nsecond"]);
    }

    #[test]
    fn comments_and_other_fields_are_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b": keepalive\n\nevent: progress\nid: 7\ndata:x\n\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn multi_byte_character_split_across_chunks() {
        let payload = "data: {\"progress\":10,\"message\":\"Café\"}\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&payload[..split]).is_empty());
        let events = decoder.feed(&payload[split..]);
        assert_eq!(events, vec![r#"{"progress":10,"message":"Café"}"#]);
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }
}
