//! Upstream SSE decoding.
//!
//! Turns the upstream's `text/event-stream` body into [`UpstreamRecord`]s:
//! partial lines are buffered across network chunks, `data:` prefixes are
//! stripped and the `[DONE]` sentinel is recognised. Identical consecutive
//! payloads are legitimate (a model repeating one token) and pass through.

// MARK: - Constants

const DONE_SENTINEL: &str = "[DONE]";

// MARK: - Upstream Record

/// One raw record of an upstream stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamRecord {
    /// A JSON-encoded fragment, not yet decoded.
    Fragment(String),
    /// The terminator sentinel.
    Done,
}

impl UpstreamRecord {
    /// Classify a `data:` payload.
    pub fn parse(payload: &str) -> Self {
        if payload.trim() == DONE_SENTINEL {
            Self::Done
        } else {
            Self::Fragment(payload.to_string())
        }
    }
}

// MARK: - SSE Parser

/// Stateful SSE line decoder.
#[derive(Debug, Default)]
pub struct SseParser {
    /// Partial line carried over from the previous chunk.
    buffer: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body and return every record it completes.
    pub fn feed(&mut self, chunk: &str) -> Vec<UpstreamRecord> {
        self.buffer.push_str(chunk);
        let mut records = Vec::new();

        while let Some(newline_pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline_pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            records.extend(parse_line(line));
        }

        records
    }

    /// Decode whatever is left once the body has ended without a final newline.
    pub fn flush(&mut self) -> Option<UpstreamRecord> {
        let remaining = std::mem::take(&mut self.buffer);
        parse_line(remaining.trim())
    }
}

fn parse_line(line: &str) -> Option<UpstreamRecord> {
    // Blank lines delimit events; `:` lines are keep-alive comments.
    // `event:`, `id:` and `retry:` fields carry nothing we use.
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    Some(UpstreamRecord::parse(data))
}

/// Decode a complete captured SSE body.
pub fn parse_body(body: &str) -> Vec<UpstreamRecord> {
    let mut parser = SseParser::new();
    let mut records = parser.feed(body);
    records.extend(parser.flush());
    records
}

// MARK: - Tests

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(s: &str) -> UpstreamRecord {
        UpstreamRecord::Fragment(s.to_string())
    }

    #[test]
    fn test_basic_data_line() {
        let mut parser = SseParser::new();
        let records = parser.feed("data: {\"id\":\"c1\"}\n\n");
        assert_eq!(records, vec![fragment("{\"id\":\"c1\"}")]);
    }

    #[test]
    fn test_done_sentinel() {
        let mut parser = SseParser::new();
        assert_eq!(parser.feed("data: [DONE]\n"), vec![UpstreamRecord::Done]);
        assert_eq!(UpstreamRecord::parse(" [DONE] "), UpstreamRecord::Done);
    }

    #[test]
    fn test_partial_line_buffering() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"partia").is_empty());
        assert_eq!(
            parser.feed("l\":true}\n"),
            vec![fragment("{\"partial\":true}")]
        );
    }

    #[test]
    fn test_non_data_lines_ignored() {
        let mut parser = SseParser::new();
        let records =
            parser.feed(": keep-alive\nevent: chunk\nid: 7\nretry: 100\n\ndata:\ndata: {}\n");
        assert_eq!(records, vec![fragment("{}")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();
        assert_eq!(
            parser.feed("data: {\"cr\":1}\r\n\r\n"),
            vec![fragment("{\"cr\":1}")]
        );
    }

    #[test]
    fn test_identical_fragments_all_delivered() {
        let line = "data: {\"id\":\"c1\",\"choices\":[{\"delta\":{\"content\":\"=\"}}]}\n\n";
        let mut body = line.repeat(120);
        body.push_str("data: {\"id\":\"c1\",\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
        body.push_str("data: [DONE]\n\n");

        let records = parse_body(&body);
        assert_eq!(records.len(), 122);
        assert!(records[..120].iter().all(|r| *r == records[0]));
        assert_eq!(records.last(), Some(&UpstreamRecord::Done));
    }

    #[test]
    fn test_done_with_surrounding_whitespace() {
        let mut parser = SseParser::new();
        assert_eq!(
            parser.feed("data:   [DONE]  \r\n"),
            vec![UpstreamRecord::Done]
        );
        // Only an exact sentinel terminates.
        assert_eq!(
            UpstreamRecord::parse("[DONE] extra"),
            fragment("[DONE] extra")
        );
    }

    #[test]
    fn test_flush_unterminated_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: {\"final\":true}").is_empty());
        assert_eq!(parser.flush(), Some(fragment("{\"final\":true}")));
        assert_eq!(parser.flush(), None);
    }

    #[test]
    fn test_flush_trailing_done() {
        let mut parser = SseParser::new();
        assert_eq!(
            parser.feed("data: {\"a\":1}\ndata: [DONE]"),
            vec![fragment("{\"a\":1}")]
        );
        assert_eq!(parser.flush(), Some(UpstreamRecord::Done));
    }

    #[test]
    fn test_split_across_reads() {
        let mut parser = SseParser::new();
        let mut records = parser.feed("id: 41\nretry: 3000\nda");
        records.extend(parser.feed("ta: {\"n\":1}\n\nevent: chunk\ndata: [DO"));
        records.extend(parser.feed("NE]\n"));
        assert_eq!(records, vec![fragment("{\"n\":1}"), UpstreamRecord::Done]);
    }

    #[test]
    fn test_parse_body() {
        let records = parse_body("data: {\"a\":1}\n\ndata: [DONE]");
        assert_eq!(records, vec![fragment("{\"a\":1}"), UpstreamRecord::Done]);
    }
}
