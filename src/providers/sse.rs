//! Minimal server-sent-events decoder for completion streams.
//!
//! Chat completion endpoints only ever use `data:` lines, so the decoder
//! yields completed data payloads rather than full SSE event records.

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    data: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stream text and collect any completed data payloads.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.push_str(chunk);
        let mut payloads = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            self.take_line(line.trim_end_matches(['\r', '\n']), &mut payloads);
        }

        payloads
    }

    /// Flush a trailing payload when the stream ends without a blank line.
    pub fn finish(mut self) -> Option<String> {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let mut payloads = Vec::new();
            self.take_line(line.trim_end_matches(['\r', '\n']), &mut payloads);
            if let Some(payload) = payloads.pop() {
                return Some(payload);
            }
        }
        if self.data.is_empty() {
            None
        } else {
            Some(self.data)
        }
    }

    fn take_line(&mut self, line: &str, payloads: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                payloads.push(std::mem::take(&mut self.data));
            }
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if let Some(value) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
        // Other fields (event, id, retry) are irrelevant for completion
        // streams and ignored.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yields_payload_per_blank_line() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed("data: {\"a\":1}\n\ndata: {\"b\":2}\n\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn joins_multiline_data() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed("data: hello\ndata: world\n\n");
        assert_eq!(payloads, vec!["hello\nworld"]);
    }

    #[test]
    fn reassembles_across_chunk_boundaries() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed("data: {\"part").is_empty());
        let payloads = decoder.feed("ial\":true}\n\n");
        assert_eq!(payloads, vec!["{\"partial\":true}"]);
    }

    #[test]
    fn ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::new();
        let payloads = decoder.feed(": keepalive\nevent: message\ndata: ok\n\n");
        assert_eq!(payloads, vec!["ok"]);
    }

    #[test]
    fn finish_flushes_trailing_payload() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed("data: [DONE]").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("[DONE]"));
    }

    #[test]
    fn finish_is_empty_when_nothing_pending() {
        let mut decoder = SseDecoder::new();
        decoder.feed("data: done\n\n");
        assert_eq!(decoder.finish(), None);
    }
}
