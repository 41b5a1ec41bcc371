//! Incremental Server-Sent-Events framing
//!
//! Providers deliver SSE over arbitrary byte boundaries; the framer buffers
//! partial lines and yields complete frames (`event:` name plus joined
//! `data:` payload) as they close on a blank line.

/// One complete SSE frame
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Stateful byte-to-frame decoder
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every frame completed by this chunk
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.accept_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing frame the stream ended without terminating
    pub fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.accept_line(line.trim_end_matches('\r'));
        }
        self.take_frame()
    }

    fn accept_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.take_frame();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data_lines.push(value.trim_start().to_string());
        }
        // id: and retry: fields are irrelevant to provider relays
        None
    }

    fn take_frame(&mut self) -> Option<SseFrame> {
        if self.data_lines.is_empty() && self.event.is_none() {
            return None;
        }
        let frame = SseFrame {
            event: self.event.take(),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        // Frames with an event name but no data (heartbeats) still surface
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b"data: {\"x\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"x\":1}");
        assert!(frames[0].event.is_none());
    }

    #[test]
    fn test_named_event() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b"event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
        assert_eq!(frames[0].event.as_deref(), Some("message_start"));
        assert_eq!(frames[0].data, "{\"type\":\"message_start\"}");
    }

    #[test]
    fn test_split_across_chunks() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: {\"content\":").is_empty());
        assert!(framer.push(b" \"hi\"}").is_empty());
        let frames = framer.push(b"\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "{\"content\": \"hi\"}");
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b"data: a\n\ndata: b\n\ndata: c\n\n");
        let datas: Vec<_> = frames.iter().map(|f| f.data.as_str()).collect();
        assert_eq!(datas, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(frames[0].data, "line1\nline2");
    }

    #[test]
    fn test_comments_ignored() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b": keepalive\n\ndata: x\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_crlf_lines() {
        let mut framer = SseFramer::new();
        let frames = framer.push(b"data: x\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "x");
    }

    #[test]
    fn test_finish_flushes_unterminated_frame() {
        let mut framer = SseFramer::new();
        assert!(framer.push(b"data: tail").is_empty());
        let frame = framer.finish().unwrap();
        assert_eq!(frame.data, "tail");
    }
}
