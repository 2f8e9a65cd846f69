use serde_json::Value;

/// One decoded response object, streamed or whole.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OllamaChunk {
    /// Incremental text from `message.content` (chat) or `response` (generate).
    pub content: String,
    pub done: bool,
    /// Server-reported failure carried in an `error` field.
    pub error: Option<String>,
}

impl OllamaChunk {
    /// Maps a decoded JSON object; non-objects yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let content = object
            .get("message")
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str)
            .or_else(|| object.get("response").and_then(Value::as_str))
            .unwrap_or("")
            .to_owned();
        let done = object.get("done").and_then(Value::as_bool).unwrap_or(false);
        let error = object
            .get("error")
            .and_then(|error| match error {
                Value::String(message) => Some(message.clone()),
                Value::Object(fields) => fields
                    .get("message")
                    .and_then(Value::as_str)
                    .map(ToString::to_string),
                _ => None,
            })
            .filter(|message| !message.trim().is_empty());

        Some(Self {
            content,
            done,
            error,
        })
    }
}

/// Incremental parser for newline-delimited JSON bodies.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct NdjsonStreamParser {
    buffer: Vec<u8>,
    malformed: usize,
}

impl NdjsonStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete objects.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<OllamaChunk> {
        self.buffer.extend_from_slice(bytes);
        let mut chunks = Vec::new();

        while let Some(split) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=split).collect();
            self.push_line(&line, &mut chunks);
        }

        chunks
    }

    /// Drain a trailing object that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<OllamaChunk> {
        let line = std::mem::take(&mut self.buffer);
        let mut chunks = Vec::new();
        self.push_line(&line, &mut chunks);
        chunks
    }

    /// Parse a complete body in one shot.
    pub fn parse_body(input: &str) -> Vec<OllamaChunk> {
        let mut parser = Self::default();
        let mut chunks = parser.feed(input.as_bytes());
        chunks.extend(parser.finish());
        chunks
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }

    /// Number of non-empty lines that were not valid JSON objects.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn push_line(&mut self, line: &[u8], chunks: &mut Vec<OllamaChunk>) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(text)
            .ok()
            .as_ref()
            .and_then(OllamaChunk::from_value)
        {
            Some(chunk) => chunks.push(chunk),
            None => self.malformed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_and_generate_shapes() {
        let chunks = NdjsonStreamParser::parse_body(concat!(
            "{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n",
            "{\"response\":\"lo\",\"done\":false}\n",
            "{\"done\":true}",
        ));

        let text: String = chunks.iter().map(|chunk| chunk.content.as_str()).collect();
        assert_eq!(text, "Hello");
        assert_eq!(chunks.last().map(|chunk| chunk.done), Some(true));
    }

    #[test]
    fn buffers_partial_lines_and_split_characters() {
        let line = "{\"response\":\"caf\u{e9}\",\"done\":false}\n".as_bytes();
        let split = line
            .iter()
            .position(|byte| *byte == 0xC3)
            .expect("two-byte character present")
            + 1;
        let mut parser = NdjsonStreamParser::default();

        assert!(parser.feed(&line[..split]).is_empty());
        let chunks = parser.feed(&line[split..]);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "caf\u{e9}");
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn surfaces_error_objects_and_counts_garbage() {
        let mut parser = NdjsonStreamParser::default();
        let chunks = parser.feed(b"not json\n{\"error\":\"model 'x' not found\"}\n");

        assert_eq!(parser.malformed_lines(), 1);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].error.as_deref(), Some("model 'x' not found"));
    }
}
