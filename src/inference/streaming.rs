//! SSE stream decoder for OpenAI-compatible chat completions.
//!
//! Turns the raw response body into ordered content fragments. The decoder
//! is a small synchronous state machine so it can be driven by any byte
//! source and tested without a network:
//!
//! ```text
//! AwaitingLine ──data: {json}──▶ fragment ──▶ AwaitingLine
//!      │  ├──comment / blank / malformed──▶ AwaitingLine
//!      │  └──data: [DONE]──▶ Complete
//!      └──connection closed──▶ Failed
//! ```

use std::time::Instant;

use crate::guard::safe_json_from_str;

use super::errors::PromptError;
use super::types::ChatCompletionChunk;

/// Event-line marker.
const DATA_PREFIX: &str = "data:";

/// Payload of the line that ends the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Largest single event line accepted (1 MiB).
pub const MAX_EVENT_BYTES: usize = 1024 * 1024;

// ─── Types ───────────────────────────────────────────────────────────────────

/// One incremental piece of generated text.
///
/// Fragments carry no sequence number; arrival order is the only order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFragment {
    pub text: String,
    /// When the fragment was decoded. Only recorded when timing was requested.
    pub timestamp: Option<Instant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    AwaitingLine,
    Complete,
    Failed,
}

/// Classification of one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    Fragment(ContentFragment),
    /// Comment, keep-alive, blank, or a chunk without content.
    Ignored,
    /// A `data:` line whose payload was not a valid chunk. Skipped.
    Malformed,
    /// The completion sentinel.
    Done,
}

// ─── StreamDecoder ───────────────────────────────────────────────────────────

/// Line-oriented event stream decoder.
#[derive(Debug)]
pub struct StreamDecoder {
    state: DecoderState,
    record_timestamps: bool,
    /// Bytes of the current, not yet terminated line.
    pending: Vec<u8>,
    /// Skipping the tail of an oversized line.
    discarding: bool,
    assembled: String,
    fragments: usize,
    malformed: usize,
}

impl Default for StreamDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitingLine,
            record_timestamps: false,
            pending: Vec::new(),
            discarding: false,
            assembled: String::new(),
            fragments: 0,
            malformed: 0,
        }
    }

    /// Stamp each fragment with its decode instant.
    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.record_timestamps = enabled;
        self
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Fragments decoded so far.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }

    /// Lines skipped because they could not be decoded.
    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    /// Classify and consume one line (without its terminator).
    pub fn feed_line(&mut self, line: &str) -> LineEvent {
        if self.state != DecoderState::AwaitingLine {
            return LineEvent::Ignored;
        }

        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix(DATA_PREFIX) else {
            return LineEvent::Ignored;
        };
        let data = data.trim();
        if data.is_empty() {
            return LineEvent::Ignored;
        }

        if data == DONE_SENTINEL {
            self.state = DecoderState::Complete;
            return LineEvent::Done;
        }

        let chunk: ChatCompletionChunk = match safe_json_from_str(data, MAX_EVENT_BYTES) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.malformed += 1;
                tracing::debug!(error = %e, "skipping malformed stream line");
                return LineEvent::Malformed;
            }
        };

        let Some(text) = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        else {
            return LineEvent::Ignored;
        };

        self.assembled.push_str(&text);
        self.fragments += 1;

        LineEvent::Fragment(ContentFragment {
            text,
            timestamp: self.record_timestamps.then(Instant::now),
        })
    }

    /// Consume raw body bytes, returning the fragments completed by them.
    ///
    /// Bytes are buffered until a full line is available, so multi-byte
    /// characters split across network reads are decoded intact.
    pub fn feed_bytes(&mut self, bytes: &[u8]) -> Vec<ContentFragment> {
        let mut out = Vec::new();
        self.pending.extend_from_slice(bytes);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if self.discarding {
                self.discarding = false;
                continue;
            }
            if let LineEvent::Fragment(fragment) = self.feed_line(&String::from_utf8_lossy(&line)) {
                out.push(fragment);
            }
        }

        if self.pending.len() > MAX_EVENT_BYTES {
            tracing::warn!(bytes = self.pending.len(), "discarding oversized stream line");
            self.pending.clear();
            if !self.discarding {
                self.malformed += 1;
            }
            self.discarding = true;
        }

        out
    }

    /// The connection closed: settle on `Complete` or `Failed`.
    ///
    /// Returns the assembled text with trailing whitespace removed, or
    /// [`PromptError::StreamTruncated`] if the sentinel never arrived.
    pub fn finish(&mut self) -> Result<String, PromptError> {
        if !self.pending.is_empty() && !self.discarding {
            let rest = std::mem::take(&mut self.pending);
            self.feed_line(&String::from_utf8_lossy(&rest));
        }
        self.pending.clear();

        if self.state == DecoderState::Complete {
            if self.malformed > 0 {
                tracing::debug!(skipped = self.malformed, "stream completed with skipped lines");
            }
            return Ok(self.assembled.trim_end().to_string());
        }

        self.state = DecoderState::Failed;
        Err(PromptError::StreamTruncated {
            received_fragments: self.fragments,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(content: &str) -> String {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": content}}]});
        format!("data: {chunk}")
    }

    fn decode_lines(lines: &[String]) -> Result<String, PromptError> {
        let mut decoder = StreamDecoder::new();
        for line in lines {
            decoder.feed_line(line);
        }
        decoder.finish()
    }

    #[test]
    fn test_fragments_concatenate_in_order() {
        let lines = vec![
            delta("Hello"),
            delta(" there"),
            delta("!"),
            "data: [DONE]".to_string(),
        ];
        assert_eq!(decode_lines(&lines).unwrap(), "Hello there!");
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut decoder = StreamDecoder::new();
        assert!(matches!(decoder.feed_line(&delta("Hello")), LineEvent::Fragment(_)));
        assert_eq!(decoder.feed_line("data: {\"choices\": [{\"delta\""), LineEvent::Malformed);
        assert!(matches!(decoder.feed_line(&delta(" world")), LineEvent::Fragment(_)));
        assert_eq!(decoder.feed_line("data: [DONE]"), LineEvent::Done);

        assert_eq!(decoder.finish().unwrap(), "Hello world");
        assert_eq!(decoder.malformed_count(), 1);
        assert_eq!(decoder.state(), DecoderState::Complete);
    }

    #[test]
    fn test_non_data_and_blank_lines_ignored() {
        let mut decoder = StreamDecoder::new();
        assert_eq!(decoder.feed_line(": keep-alive"), LineEvent::Ignored);
        assert_eq!(decoder.feed_line(""), LineEvent::Ignored);
        assert_eq!(decoder.feed_line("event: message"), LineEvent::Ignored);
        assert_eq!(decoder.feed_line("data:"), LineEvent::Ignored);
        assert_eq!(
            decoder.feed_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            LineEvent::Ignored
        );
        assert_eq!(decoder.feed_line(r#"data: {"choices":[]}"#), LineEvent::Ignored);
        assert_eq!(decoder.fragment_count(), 0);
    }

    #[test]
    fn test_done_without_space_after_colon() {
        let mut decoder = StreamDecoder::new();
        decoder.feed_line(&delta("x"));
        assert_eq!(decoder.feed_line("data:[DONE]\r"), LineEvent::Done);
        assert_eq!(decoder.finish().unwrap(), "x");
    }

    #[test]
    fn test_lines_after_done_are_ignored() {
        let lines = vec![delta("a"), "data: [DONE]".into(), delta("b")];
        assert_eq!(decode_lines(&lines).unwrap(), "a");
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut decoder = StreamDecoder::new();
        decoder.feed_line(&delta("partial"));
        let err = decoder.finish().unwrap_err();
        assert!(matches!(err, PromptError::StreamTruncated { received_fragments: 1 }));
        assert_eq!(decoder.state(), DecoderState::Failed);
    }

    #[test]
    fn test_trailing_whitespace_stripped() {
        let lines = vec![delta("Response with newlines\n\n\n"), "data: [DONE]".into()];
        assert_eq!(decode_lines(&lines).unwrap(), "Response with newlines");
    }

    #[test]
    fn test_leading_whitespace_kept() {
        let lines = vec![delta("\n  indented"), "data: [DONE]".into()];
        assert_eq!(decode_lines(&lines).unwrap(), "\n  indented");
    }

    #[test]
    fn test_feed_bytes_reassembles_split_utf8() {
        let body = format!(
            "{}\n\n{}\n\n{}\n\n{}\n\ndata: [DONE]\n\n",
            delta("å"),
            delta("æ"),
            delta("ø"),
            delta("日本語")
        );
        let bytes = body.as_bytes();

        // Feed one byte at a time so every multi-byte char is split.
        let mut decoder = StreamDecoder::new();
        let mut fragments = Vec::new();
        for b in bytes {
            fragments.extend(decoder.feed_bytes(std::slice::from_ref(b)));
        }

        let texts: Vec<&str> = fragments.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, vec!["å", "æ", "ø", "日本語"]);
        assert_eq!(decoder.finish().unwrap(), "åæø日本語");
    }

    #[test]
    fn test_feed_bytes_crlf_and_unterminated_sentinel() {
        let body = format!("{}\r\n\r\ndata: [DONE]", delta("ok"));
        let mut decoder = StreamDecoder::new();
        let fragments = decoder.feed_bytes(body.as_bytes());
        assert_eq!(fragments.len(), 1);
        assert_eq!(decoder.finish().unwrap(), "ok");
    }

    #[test]
    fn test_oversized_line_discarded() {
        let mut decoder = StreamDecoder::new();
        let huge = format!("data: {}", "x".repeat(MAX_EVENT_BYTES + 10));
        assert!(decoder.feed_bytes(huge.as_bytes()).is_empty());
        assert!(decoder.feed_bytes(b"still the same line\n").is_empty());

        let rest = format!("{}\ndata: [DONE]\n", delta("after"));
        let fragments = decoder.feed_bytes(rest.as_bytes());
        assert_eq!(fragments.len(), 1);
        assert_eq!(decoder.finish().unwrap(), "after");
        assert_eq!(decoder.malformed_count(), 1);
    }

    #[test]
    fn test_timestamps_only_when_requested() {
        let mut plain = StreamDecoder::new();
        match plain.feed_line(&delta("a")) {
            LineEvent::Fragment(f) => assert!(f.timestamp.is_none()),
            other => panic!("unexpected {other:?}"),
        }

        let mut timed = StreamDecoder::new().with_timestamps(true);
        match timed.feed_line(&delta("a")) {
            LineEvent::Fragment(f) => assert!(f.timestamp.is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
