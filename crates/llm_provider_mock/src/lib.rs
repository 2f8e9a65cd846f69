//! Deterministic scripted implementation of the shared `llm_provider` contract.
//!
//! This crate contains no transport logic and is intended for offline runs
//! and contract-level testing of everything built on top of a [`Generator`].

use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use llm_provider::{
    CancelSignal, GenerationError, GenerationRequest, GenerationStatus, Generator,
    GeneratorProfile, OutputShape, Role,
};

/// Stable generator identifier used for explicit backend selection.
pub const MOCK_GENERATOR_ID: &str = "mock";

/// How a scripted call ends once its chunks are emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedEnd {
    Complete,
    TimedOut,
    Cancelled,
    Fail(String),
}

/// One scripted generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedResponse {
    pub chunks: Vec<String>,
    pub end: ScriptedEnd,
    pub chunk_delay: Duration,
}

impl ScriptedResponse {
    /// Emits `chunks` exactly as given.
    #[must_use]
    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            end: ScriptedEnd::Complete,
            chunk_delay: Duration::ZERO,
        }
    }

    /// Emits `text` one line at a time, newlines kept.
    #[must_use]
    pub fn text(text: &str) -> Self {
        Self::chunks(text.split_inclusive('\n'))
    }

    /// Emits `text` one word at a time, like a token stream.
    #[must_use]
    pub fn tokens(text: &str) -> Self {
        let mut chunks = Vec::new();
        let mut pending = String::new();
        for ch in text.chars() {
            pending.push(ch);
            if matches!(ch, ' ' | '\n') {
                chunks.push(std::mem::take(&mut pending));
            }
        }
        if !pending.is_empty() {
            chunks.push(pending);
        }
        Self::chunks(chunks)
    }

    /// A call that fails before emitting anything.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::chunks(Vec::<String>::new()).ending(ScriptedEnd::Fail(message.into()))
    }

    #[must_use]
    pub fn ending(mut self, end: ScriptedEnd) -> Self {
        self.end = end;
        self
    }

    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

type Responder = Box<dyn Fn(&GenerationRequest) -> ScriptedResponse + Send + Sync>;

/// Replays queued responses in order and records every request it receives.
pub struct ScriptedGenerator {
    model_id: String,
    output_shape: OutputShape,
    script: Mutex<VecDeque<ScriptedResponse>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Creates a generator that answers calls with `responses`, in order.
    #[must_use]
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            model_id: "scripted".to_string(),
            output_shape: OutputShape::CompletionOnly,
            script: Mutex::new(responses.into()),
            responder: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a generator answering every call by echoing the last user turn.
    #[must_use]
    pub fn echo() -> Self {
        let mut generator = Self::new(Vec::new());
        generator.model_id = "echo".to_string();
        generator.responder = Some(Box::new(|req: &GenerationRequest| {
            let question = req
                .messages
                .iter()
                .rev()
                .find(|message| message.role == Role::User)
                .map(|message| message.content.trim())
                .unwrap_or("");
            ScriptedResponse::tokens(&format!(
                "<think>The user asked: {question}</think>You said: {question}"
            ))
            .with_chunk_delay(Duration::from_millis(Self::TOKEN_DELAY_MS))
        }));
        generator
    }

    #[must_use]
    pub fn with_output_shape(mut self, output_shape: OutputShape) -> Self {
        self.output_shape = output_shape;
        self
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    /// Queues one more response behind the existing script.
    pub fn push(&self, response: ScriptedResponse) {
        lock_unpoisoned(&self.script).push_back(response);
    }

    /// Requests received so far, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        lock_unpoisoned(&self.script).len()
    }

    fn next_response(&self, req: &GenerationRequest) -> Option<ScriptedResponse> {
        if let Some(response) = lock_unpoisoned(&self.script).pop_front() {
            return Some(response);
        }
        self.responder.as_ref().map(|responder| responder(req))
    }

    const TOKEN_DELAY_MS: u64 = 20;
}

impl Generator for ScriptedGenerator {
    fn profile(&self) -> GeneratorProfile {
        GeneratorProfile {
            generator_id: MOCK_GENERATOR_ID.to_string(),
            model_id: self.model_id.clone(),
            output_shape: self.output_shape,
        }
    }

    fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(&str),
    ) -> Result<GenerationStatus, GenerationError> {
        lock_unpoisoned(&self.requests).push(req.clone());
        req.validate()?;

        let Some(response) = self.next_response(req) else {
            return Err(GenerationError::Protocol(
                "scripted generator has no response left".to_string(),
            ));
        };

        for chunk in &response.chunks {
            if cancel.load(Ordering::Acquire) {
                return Ok(GenerationStatus::Cancelled);
            }
            emit(chunk);
            if !response.chunk_delay.is_zero() {
                thread::sleep(response.chunk_delay);
            }
        }

        if cancel.load(Ordering::Acquire) {
            return Ok(GenerationStatus::Cancelled);
        }

        match response.end {
            ScriptedEnd::Complete => Ok(GenerationStatus::Completed),
            ScriptedEnd::TimedOut => Ok(GenerationStatus::TimedOut),
            ScriptedEnd::Cancelled => Ok(GenerationStatus::Cancelled),
            ScriptedEnd::Fail(message) => Err(GenerationError::Transport(message)),
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
