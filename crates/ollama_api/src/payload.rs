use serde::{Deserialize, Serialize};

use crate::config::OllamaEndpoint;

/// Sampling options shared by both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    /// Maximum number of tokens to generate.
    pub num_predict: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Payload for `/api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: GenerateOptions,
}

/// Payload for `/api/generate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub options: GenerateOptions,
}

/// Either request shape; serializes as the bare inner payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OllamaRequest {
    Chat(ChatRequest),
    Generate(GenerateRequest),
}

impl OllamaRequest {
    pub fn endpoint(&self) -> OllamaEndpoint {
        match self {
            Self::Chat(_) => OllamaEndpoint::Chat,
            Self::Generate(_) => OllamaEndpoint::Generate,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::Chat(request) => &request.model,
            Self::Generate(request) => &request.model,
        }
    }

    pub fn is_stream(&self) -> bool {
        match self {
            Self::Chat(request) => request.stream,
            Self::Generate(request) => request.stream,
        }
    }
}

impl From<ChatRequest> for OllamaRequest {
    fn from(request: ChatRequest) -> Self {
        Self::Chat(request)
    }
}

impl From<GenerateRequest> for OllamaRequest {
    fn from(request: GenerateRequest) -> Self {
        Self::Generate(request)
    }
}
