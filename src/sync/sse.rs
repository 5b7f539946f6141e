//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; complete frames come out in stream order.
//! Lines end with `\n` or `\r\n`. Comment lines (`: ping`) are dropped, and an
//! unterminated frame at end of stream is discarded. A line longer than
//! [`MAX_LINE_BYTES`] drops the whole frame it belongs to.

/// Longest line the decoder buffers while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseFrame {
    /// `event:` field, if the server set one
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`
    pub data: String,
    /// `id:` field, if the server set one
    pub id: Option<String>,
}

/// Line-buffering frame decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
    event: Option<String>,
    id: Option<String>,
    /// Rest of an oversized line is still arriving
    skip_line: bool,
    /// Ignore lines until the blank line closing the current frame
    discard_frame: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.skip_line {
                self.skip_line = false;
                continue;
            }
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if self.discard_frame {
                self.discard_frame = !line.is_empty();
                continue;
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }

        if self.pending.len() > MAX_LINE_BYTES {
            tracing::warn!(
                bytes = self.pending.len(),
                "event stream line exceeds limit, dropping frame"
            );
            self.pending.clear();
            self.data.clear();
            self.event = None;
            self.skip_line = true;
            self.discard_frame = true;
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // retry and unknown fields carry nothing we use
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event,
            data,
            id: self.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: {\"type\":\"mission_created\"}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, r#"{"type":"mission_created"}"#);
        assert!(frames[0].event.is_none());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: {\"type\":").is_empty());
        assert!(decoder.feed(b"\"audit.created\"}\n").is_empty());
        let frames = decoder.feed(b"\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, r#"{"type":"audit.created"}"#);
    }

    #[test]
    fn test_keepalive_comment_ignored() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b": ping\n\ndata: a\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a");
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: first\ndata: second\n\n");
        assert_eq!(frames[0].data, "first\nsecond");
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"event: update\r\nid: 7\r\ndata: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("update"));
        assert_eq!(frames[0].id.as_deref(), Some("7"));
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_frames_in_order() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data: 1\n\ndata: 2\n\ndata: 3\n\n");
        let data: Vec<&str> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(data, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_unterminated_frame_held_back() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: partial\n").is_empty());
    }

    #[test]
    fn test_oversized_line_drops_its_frame_only() {
        let mut decoder = SseDecoder::new();
        let mut huge = b"data: ".to_vec();
        huge.resize(MAX_LINE_BYTES + 10, b'x');
        assert!(decoder.feed(&huge).is_empty());
        assert!(decoder.pending.is_empty());

        // Tail of the long line, then a trailing data line of the same frame
        assert!(decoder.feed(b"xxxx\ndata: more\n\n").is_empty());

        let frames = decoder.feed(b"data: next\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "next");
    }

    #[test]
    fn test_data_without_space() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.feed(b"data:tight\n\n");
        assert_eq!(frames[0].data, "tight");
    }
}
