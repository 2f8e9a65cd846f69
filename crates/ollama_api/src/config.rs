use std::time::Duration;

use crate::retry::{BASE_DELAY_MS, MAX_RETRIES};
use crate::url::DEFAULT_OLLAMA_BASE_URL;

/// Which generation route requests are sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OllamaEndpoint {
    /// `/api/chat`, role-tagged messages in, `message.content` out.
    #[default]
    Chat,
    /// `/api/generate`, flat prompt in, `response` out.
    Generate,
}

impl OllamaEndpoint {
    #[must_use]
    pub fn path(&self) -> &'static str {
        match self {
            Self::Chat => "/api/chat",
            Self::Generate => "/api/generate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Some(Self::Chat),
            "generate" => Some(Self::Generate),
            _ => None,
        }
    }
}

/// Transport configuration for Ollama requests.
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Server root, e.g. `http://localhost:11434`.
    pub base_url: String,
    pub model: String,
    pub endpoint: OllamaEndpoint,
    /// Wall-clock limit for one call including retries.
    pub timeout: Option<Duration>,
    /// Retry attempts after the initial request.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            model: String::new(),
            endpoint: OllamaEndpoint::Chat,
            timeout: None,
            max_retries: MAX_RETRIES,
            retry_base_delay: Duration::from_millis(BASE_DELAY_MS),
        }
    }
}

impl OllamaConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: OllamaEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}
