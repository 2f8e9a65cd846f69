//! Tag-aware stream decoder.
//!
//! Splits a generator's raw chunk sequence into thinking and answer segments.
//! Delimiter tags may be split across any number of chunks; the decoder holds
//! back the shortest tail that could still grow into a tag and re-scans once
//! more text arrives.

use llm_provider::{OutputShape, ROLE_MARKER};
use tracing::trace;

pub const DEFAULT_OPEN_TAG: &str = "<think>";
pub const DEFAULT_CLOSE_TAG: &str = "</think>";

/// Line prefixes printed by llama.cpp-style runtimes around the completion.
pub const DEFAULT_NOISE_PREFIXES: &[&str] = &[
    "llama_model_loader:",
    "llama_perf",
    "print_info:",
    "load_tensors:",
    "llama_context:",
    "llama_kv_cache",
    "ggml_",
    "system_info:",
    "main: build",
    "main: seed",
    "main: llama",
    "main: load",
    "main: prompt",
    "main: number of tokens",
    "main: interactive",
    "main: chat template",
    "main: n_ctx",
    "main: decoded",
    "sampler seed:",
    "sampler params:",
    "sampler chain:",
    "generate:",
    "== Running",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Output up to and including the `start_occurrence`-th appearance of
    /// this marker is dropped.
    pub start_marker: Option<String>,
    /// Which appearance of `start_marker` opens the answer, counting from 1.
    pub start_occurrence: usize,
    pub open_tag: String,
    pub close_tag: String,
    /// Lines starting with any of these (after leading whitespace) are dropped.
    pub noise_prefixes: Vec<String>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self::for_shape(OutputShape::EchoedPrompt)
    }
}

impl DecoderConfig {
    /// Gating and filtering suited to how a generator shapes its output.
    #[must_use]
    pub fn for_shape(shape: OutputShape) -> Self {
        match shape {
            OutputShape::EchoedPrompt => Self {
                start_marker: Some(ROLE_MARKER.to_string()),
                start_occurrence: 1,
                open_tag: DEFAULT_OPEN_TAG.to_string(),
                close_tag: DEFAULT_CLOSE_TAG.to_string(),
                noise_prefixes: DEFAULT_NOISE_PREFIXES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            },
            OutputShape::CompletionOnly => Self {
                start_marker: None,
                start_occurrence: 1,
                open_tag: DEFAULT_OPEN_TAG.to_string(),
                close_tag: DEFAULT_CLOSE_TAG.to_string(),
                noise_prefixes: Vec::new(),
            },
        }
    }

    #[must_use]
    pub fn with_tags(mut self, open_tag: impl Into<String>, close_tag: impl Into<String>) -> Self {
        self.open_tag = open_tag.into();
        self.close_tag = close_tag.into();
        self
    }

    /// Gates on the marker that closes `prompt` rather than on any earlier
    /// turn the runtime echoes back with it.
    #[must_use]
    pub fn for_echoed_prompt(mut self, prompt: &str) -> Self {
        self.start_occurrence = match self.start_marker.as_deref() {
            Some(marker) if !marker.is_empty() => prompt.matches(marker).count().max(1),
            _ => 1,
        };
        self
    }

    #[must_use]
    pub fn with_start_marker(mut self, start_marker: Option<String>) -> Self {
        self.start_marker = start_marker;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Thinking,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSegment {
    pub kind: SegmentKind,
    pub text: String,
}

impl DecodedSegment {
    #[must_use]
    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Thinking,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn answer(text: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Answer,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitingStart,
    Answer,
    Thinking,
}

/// Final product of one decoded stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedResponse {
    /// Concatenated answer segments, or the filtered raw output on fallback.
    pub answer: String,
    pub thinking: String,
    /// Every non-noise chunk, in arrival order.
    pub raw: String,
    /// No answer text survived decoding, so `answer` holds `raw`.
    pub used_fallback: bool,
    /// A closing tag appeared outside a thinking region and was dropped.
    pub malformed: bool,
}

impl DecodedResponse {
    /// The canonical response: the answer trimmed of surrounding whitespace.
    #[must_use]
    pub fn text(&self) -> &str {
        self.answer.trim()
    }
}

#[derive(Debug)]
pub struct StreamDecoder {
    config: DecoderConfig,
    state: DecodeState,
    markers_left: usize,
    pending: String,
    answer: String,
    thinking: String,
    raw: String,
    at_line_start: bool,
    dropping_line: bool,
    malformed: bool,
    flushed: bool,
}

impl StreamDecoder {
    #[must_use]
    pub fn new(config: DecoderConfig) -> Self {
        let state = if config.start_marker.as_deref().is_some_and(|m| !m.is_empty()) {
            DecodeState::AwaitingStart
        } else {
            DecodeState::Answer
        };
        let markers_left = config.start_occurrence.max(1);
        Self {
            config,
            state,
            markers_left,
            pending: String::new(),
            answer: String::new(),
            thinking: String::new(),
            raw: String::new(),
            at_line_start: true,
            dropping_line: false,
            malformed: false,
            flushed: false,
        }
    }

    /// Feeds one raw chunk and returns the segments it completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<DecodedSegment> {
        let mut segments = Vec::new();
        if chunk.is_empty() || self.flushed {
            return segments;
        }

        let starts_line = self.at_line_start;
        self.at_line_start = chunk.ends_with('\n');

        if self.dropping_line {
            self.dropping_line = !chunk.contains('\n');
            return segments;
        }
        if starts_line && self.is_noise(chunk) {
            trace!(chunk, "dropping diagnostic line");
            self.dropping_line = !chunk.contains('\n');
            return segments;
        }

        self.raw.push_str(chunk);
        self.pending.push_str(chunk);
        self.drain(&mut segments);
        segments
    }

    /// Ends the stream and returns any segments still held back.
    ///
    /// A trailing partial tag in answer text is real text and is emitted. An
    /// unterminated thinking region closes here; held-back thinking text is
    /// discarded.
    pub fn flush(&mut self) -> Vec<DecodedSegment> {
        let mut segments = Vec::new();
        if self.flushed {
            return segments;
        }
        self.flushed = true;

        let rest = std::mem::take(&mut self.pending);
        match self.state {
            DecodeState::AwaitingStart => {
                trace!("stream ended before the start marker");
            }
            DecodeState::Answer => self.emit(SegmentKind::Answer, &rest, &mut segments),
            DecodeState::Thinking => {
                trace!("stream ended inside a thinking region");
            }
        }
        segments
    }

    /// Flushes and produces the decoded response.
    #[must_use]
    pub fn finish(mut self) -> DecodedResponse {
        let _ = self.flush();
        let used_fallback = self.answer.trim().is_empty();
        let answer = if used_fallback {
            self.raw.clone()
        } else {
            self.answer
        };
        DecodedResponse {
            answer,
            thinking: self.thinking,
            raw: self.raw,
            used_fallback,
            malformed: self.malformed,
        }
    }

    /// Decodes a complete chunk sequence in one call.
    #[must_use]
    pub fn decode_all<'a, I>(config: DecoderConfig, chunks: I) -> (Vec<DecodedSegment>, DecodedResponse)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut decoder = Self::new(config);
        let mut segments: Vec<DecodedSegment> = Vec::new();
        let mut push = |segment: DecodedSegment| match segments.last_mut() {
            Some(last) if last.kind == segment.kind => last.text.push_str(&segment.text),
            _ => segments.push(segment),
        };
        for chunk in chunks {
            decoder.feed(chunk).into_iter().for_each(&mut push);
        }
        decoder.flush().into_iter().for_each(&mut push);
        (segments, decoder.finish())
    }

    fn is_noise(&self, chunk: &str) -> bool {
        let line = chunk.trim_start();
        self.config
            .noise_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && line.starts_with(prefix.as_str()))
    }

    fn drain(&mut self, segments: &mut Vec<DecodedSegment>) {
        loop {
            match self.state {
                DecodeState::AwaitingStart => {
                    let marker = self.config.start_marker.clone().unwrap_or_default();
                    if let Some(index) = self.pending.find(&marker) {
                        self.pending.drain(..index + marker.len());
                        self.markers_left = self.markers_left.saturating_sub(1);
                        if self.markers_left == 0 {
                            self.state = DecodeState::Answer;
                            trace!("start marker found");
                        }
                        continue;
                    }
                    let keep = partial_tag_suffix(&self.pending, &marker);
                    let cut = self.pending.len() - keep;
                    self.pending.drain(..cut);
                    return;
                }
                DecodeState::Answer => {
                    let open = find_tag(&self.pending, &self.config.open_tag);
                    let close = find_tag(&self.pending, &self.config.close_tag);
                    match (open, close) {
                        (Some(open_at), None) => self.open_thinking(open_at, segments),
                        (Some(open_at), Some(close_at)) if open_at <= close_at => {
                            self.open_thinking(open_at, segments);
                        }
                        (_, Some(close_at)) => {
                            let before = self.take_until(close_at, self.config.close_tag.len());
                            self.emit(SegmentKind::Answer, &before, segments);
                            self.malformed = true;
                            trace!("dropped closing tag outside a thinking region");
                        }
                        (None, None) => {
                            let keep = partial_tag_suffix(&self.pending, &self.config.open_tag)
                                .max(partial_tag_suffix(&self.pending, &self.config.close_tag));
                            let cut = self.pending.len() - keep;
                            let ready: String = self.pending.drain(..cut).collect();
                            self.emit(SegmentKind::Answer, &ready, segments);
                            return;
                        }
                    }
                }
                DecodeState::Thinking => {
                    if let Some(close_at) = find_tag(&self.pending, &self.config.close_tag) {
                        let inside = self.take_until(close_at, self.config.close_tag.len());
                        self.emit(SegmentKind::Thinking, &inside, segments);
                        self.state = DecodeState::Answer;
                        trace!("thinking region closed");
                        continue;
                    }
                    let keep = partial_tag_suffix(&self.pending, &self.config.close_tag);
                    let cut = self.pending.len() - keep;
                    let ready: String = self.pending.drain(..cut).collect();
                    self.emit(SegmentKind::Thinking, &ready, segments);
                    return;
                }
            }
        }
    }

    fn open_thinking(&mut self, open_at: usize, segments: &mut Vec<DecodedSegment>) {
        let before = self.take_until(open_at, self.config.open_tag.len());
        self.emit(SegmentKind::Answer, &before, segments);
        self.state = DecodeState::Thinking;
        trace!("thinking region opened");
    }

    /// Removes `pending[..index + tag_len]` and returns the text before the tag.
    fn take_until(&mut self, index: usize, tag_len: usize) -> String {
        let before = self.pending[..index].to_string();
        self.pending.drain(..index + tag_len);
        before
    }

    fn emit(&mut self, kind: SegmentKind, text: &str, segments: &mut Vec<DecodedSegment>) {
        if text.is_empty() {
            return;
        }
        match kind {
            SegmentKind::Answer => self.answer.push_str(text),
            SegmentKind::Thinking => self.thinking.push_str(text),
        }
        match segments.last_mut() {
            Some(last) if last.kind == kind => last.text.push_str(text),
            _ => segments.push(DecodedSegment {
                kind,
                text: text.to_string(),
            }),
        }
    }
}

fn find_tag(text: &str, tag: &str) -> Option<usize> {
    if tag.is_empty() {
        return None;
    }
    text.find(tag)
}

/// Length of the longest proper prefix of `tag` that `text` ends with.
fn partial_tag_suffix(text: &str, tag: &str) -> usize {
    let longest = tag.len().saturating_sub(1).min(text.len());
    (1..=longest)
        .rev()
        .find(|&len| {
            tag.is_char_boundary(len)
                && text.is_char_boundary(text.len() - len)
                && text.ends_with(&tag[..len])
        })
        .unwrap_or(0)
}
