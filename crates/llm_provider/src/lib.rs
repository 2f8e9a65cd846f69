//! Minimal provider-agnostic contract for executing a single generation call.
//!
//! This crate defines the conversation model, the request value object, the
//! shared cancellation flag, and the [`Generator`] trait implemented by every
//! backend. It excludes transport details, output decoding, and multi-call
//! reasoning strategies.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

mod error;
mod prompt;

pub use error::GenerationError;
pub use prompt::{build_prompt, ROLE_MARKER};

/// Shared cancellation flag for a generation call.
pub type CancelSignal = Arc<AtomicBool>;

/// Creates a fresh, unset cancellation flag.
#[must_use]
pub fn cancel_signal() -> CancelSignal {
    Arc::new(AtomicBool::new(false))
}

/// Error returned while constructing a generator before any call starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorInitError {
    message: String,
}

impl GeneratorInitError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for GeneratorInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for GeneratorInitError {}

impl From<String> for GeneratorInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for GeneratorInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Speaker of one conversation turn.
///
/// Unknown role names are preserved as [`Role::Other`] so that prompts built
/// from foreign transcripts keep their labels.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    System,
    User,
    Assistant,
    Other(String),
}

impl Role {
    /// Wire name used by chat-style HTTP endpoints.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Other(name) => name,
        }
    }

    /// Capitalized label used by the plain-text prompt format.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::System => "System".to_string(),
            Self::User => "User".to_string(),
            Self::Assistant => "Assistant".to_string(),
            Self::Other(name) => capitalize(name),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        match value {
            "system" => Self::System,
            "user" => Self::User,
            "assistant" => Self::Assistant,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// One role-tagged conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

pub const DEFAULT_TEMPERATURE: f32 = 0.2;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Input for one generation call. Built per call and not mutated after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
    pub show_thinking: bool,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            stream: true,
            show_thinking: false,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    #[must_use]
    pub fn with_show_thinking(mut self, show_thinking: bool) -> Self {
        self.show_thinking = show_thinking;
        self
    }

    /// Checks the numeric ranges every backend relies on.
    pub fn validate(&self) -> Result<(), GenerationError> {
        if !self.temperature.is_finite() || !(0.0..=MAX_TEMPERATURE).contains(&self.temperature)
        {
            return Err(GenerationError::InvalidRequest(format!(
                "temperature must be within [0, {MAX_TEMPERATURE}], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(GenerationError::InvalidRequest(
                "max_tokens must be positive".to_string(),
            ));
        }
        if self.messages.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "at least one message is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a backend's raw output relates to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputShape {
    /// Output repeats the prompt (and runtime diagnostics) before the completion;
    /// response content starts after the [`ROLE_MARKER`] that closes the prompt.
    EchoedPrompt,
    /// Output is completion text only.
    CompletionOnly,
}

/// Immutable metadata describing a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorProfile {
    pub generator_id: String,
    pub model_id: String,
    pub output_shape: OutputShape,
}

/// How a generation call ended when it did not fail outright.
///
/// Timeouts and cancellations are statuses, not errors: chunks emitted before
/// the cutoff remain valid partial output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Completed,
    TimedOut,
    Cancelled,
}

impl GenerationStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "complete",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Backend interface for executing one generation call.
pub trait Generator: Send + Sync + 'static {
    /// Returns generator/model identity metadata.
    fn profile(&self) -> GeneratorProfile;

    /// Executes a request, emitting raw output chunks in arrival order.
    ///
    /// Implementations block until the backend finishes, the configured
    /// timeout fires, or `cancel` is set, and must release every resource
    /// they acquired (processes, connections) before returning.
    fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(&str),
    ) -> Result<GenerationStatus, GenerationError>;
}
