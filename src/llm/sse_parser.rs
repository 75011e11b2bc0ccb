use crate::errors::{GridClawError, GridClawResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

fn chunk(kind: StreamChunkKind, content: &str) -> StreamChunk {
    StreamChunk {
        kind,
        content: content.to_string(),
    }
}

/// Parses a raw SSE line (OpenAI-compatible format) into stream chunks.
/// Keep-alive and non-data lines yield nothing. One delta may carry both
/// reasoning and content; reasoning comes first, then content, then `Done`.
pub fn parse_sse_line(line: &str) -> GridClawResult<Vec<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(Vec::new());
    }

    let data = if let Some(d) = line.strip_prefix("data:") {
        d.trim()
    } else {
        return Ok(Vec::new());
    };

    if data == "[DONE]" {
        return Ok(vec![chunk(StreamChunkKind::Done, "")]);
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| GridClawError::SseParsing(e.to_string()))?;

    if let Some(err) = json.get("error") {
        return Err(GridClawError::LlmProvider(err.to_string()));
    }

    let mut chunks = Vec::new();
    if let Some(first) = json["choices"].as_array().and_then(|c| c.first()) {
        let delta = &first["delta"];

        // Some models (DeepSeek and friends) expose their chain of thought separately.
        if let Some(reasoning) = delta["reasoning_content"].as_str().filter(|r| !r.is_empty()) {
            chunks.push(chunk(StreamChunkKind::Reasoning, reasoning));
        }
        if let Some(content) = delta["content"].as_str().filter(|c| !c.is_empty()) {
            chunks.push(chunk(StreamChunkKind::Content, content));
        }
        if first["finish_reason"].as_str().is_some() {
            chunks.push(chunk(StreamChunkKind::Done, ""));
        }
    }

    Ok(chunks)
}

/// Splits a byte stream into SSE lines.
///
/// Network chunks may cut a line (or a multi-byte UTF-8 sequence) anywhere,
/// so bytes are buffered until a `\n` arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every complete non-empty line.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the byte stream ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!line.is_empty()).then_some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#;
        let chunks = parse_sse_line(line).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, StreamChunkKind::Content);
        assert_eq!(chunks[0].content, "Hello");
    }

    #[test]
    fn reasoning_and_content_in_one_delta_are_both_kept() {
        let line = r#"data: {"choices":[{"delta":{"reasoning_content":"think","content":"<action>"},"finish_reason":"stop"}]}"#;
        let chunks = parse_sse_line(line).unwrap();
        let kinds: Vec<_> = chunks.iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![StreamChunkKind::Reasoning, StreamChunkKind::Content, StreamChunkKind::Done]
        );
        assert_eq!(chunks[1].content, "<action>");
    }

    #[test]
    fn done_marker_and_keepalive() {
        let done = parse_sse_line("data: [DONE]").unwrap();
        assert_eq!(done[0].kind, StreamChunkKind::Done);
        assert!(parse_sse_line(": keep-alive").unwrap().is_empty());
        assert!(parse_sse_line("event: ping").unwrap().is_empty());
    }

    #[test]
    fn provider_error_payload_is_surfaced() {
        let line = r#"data: {"error":{"message":"rate limited"}}"#;
        assert!(matches!(parse_sse_line(line), Err(GridClawError::LlmProvider(_))));
    }

    #[test]
    fn line_buffer_joins_split_chunks() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(b"data: {\"a\"").is_empty());
        let lines = buf.push(b":1}\n\ndata: [DO");
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string()]);
        let lines = buf.push(b"NE]\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
        assert!(buf.finish().is_none());
    }

    #[test]
    fn line_buffer_keeps_multibyte_characters_intact() {
        let text = "data: é\n".as_bytes();
        let mut buf = SseLineBuffer::new();
        assert!(buf.push(&text[..7]).is_empty());
        let lines = buf.push(&text[7..]);
        assert_eq!(lines, vec!["data: é".to_string()]);
    }
}
