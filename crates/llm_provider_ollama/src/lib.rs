//! Ollama-backed implementation of the shared `llm_provider` contract.
//!
//! This adapter translates `ollama_api` transport results into generation
//! statuses: cancellation and deadline cutoffs become
//! [`GenerationStatus::Cancelled`] / [`GenerationStatus::TimedOut`] while the
//! deltas already emitted stay valid output.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use llm_provider::{
    build_prompt, CancelSignal, GenerationError, GenerationRequest, GenerationStatus, Generator,
    GeneratorInitError, GeneratorProfile, OutputShape,
};
use ollama_api::{
    ChatMessage, ChatRequest, GenerateOptions, GenerateRequest, OllamaApiError, OllamaClient,
    OllamaConfig, OllamaEndpoint, OllamaRequest,
};
use tracing::debug;

/// Stable generator identifier used by backend selection.
pub const OLLAMA_GENERATOR_ID: &str = "ollama";

/// Runtime configuration for the Ollama generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OllamaGeneratorConfig {
    pub model: String,
    pub base_url: Option<String>,
    pub endpoint: OllamaEndpoint,
    pub timeout: Option<Duration>,
}

impl OllamaGeneratorConfig {
    #[must_use]
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: None,
            endpoint: OllamaEndpoint::Chat,
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: OllamaEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn into_ollama_config(self) -> OllamaConfig {
        let mut config = OllamaConfig::new(self.model).with_endpoint(self.endpoint);

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        config
    }
}

trait StreamClient: Send + Sync {
    fn generate(
        &self,
        request: &OllamaRequest,
        cancel: &CancelSignal,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<(), OllamaApiError>;
}

#[derive(Debug)]
struct DefaultStreamClient {
    client: OllamaClient,
}

impl StreamClient for DefaultStreamClient {
    fn generate(
        &self,
        request: &OllamaRequest,
        cancel: &CancelSignal,
        on_delta: &mut dyn FnMut(&str),
    ) -> Result<(), OllamaApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                OllamaApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(
            self.client
                .generate_with_handler(request, Some(cancel), |delta| on_delta(delta)),
        )
    }
}

/// `Generator` adapter backed by `ollama_api` transport primitives.
pub struct OllamaGenerator {
    model: String,
    endpoint: OllamaEndpoint,
    stream_client: Arc<dyn StreamClient>,
}

impl OllamaGenerator {
    /// Creates a generator using real HTTP transport.
    pub fn new(config: OllamaGeneratorConfig) -> Result<Self, GeneratorInitError> {
        let model = config.model.trim().to_string();
        let endpoint = config.endpoint;
        let stream_client = Arc::new(DefaultStreamClient {
            client: OllamaClient::new(config.into_ollama_config()).map_err(map_init_error)?,
        });

        Ok(Self {
            model,
            endpoint,
            stream_client,
        })
    }

    fn build_request(&self, req: &GenerationRequest) -> Result<OllamaRequest, GenerationError> {
        let options = GenerateOptions {
            temperature: req.temperature,
            num_predict: req.max_tokens,
        };
        let request = match self.endpoint {
            OllamaEndpoint::Chat => OllamaRequest::Chat(ChatRequest {
                model: self.model.clone(),
                messages: req
                    .messages
                    .iter()
                    .map(|message| ChatMessage::new(message.role.as_str(), &message.content))
                    .collect(),
                stream: req.stream,
                options,
            }),
            OllamaEndpoint::Generate => OllamaRequest::Generate(GenerateRequest {
                model: self.model.clone(),
                prompt: build_prompt(&req.messages)?,
                stream: req.stream,
                options,
            }),
        };
        Ok(request)
    }

    #[cfg(test)]
    fn with_stream_client_for_tests(
        model: &str,
        endpoint: OllamaEndpoint,
        stream_client: Arc<dyn StreamClient>,
    ) -> Self {
        Self {
            model: model.to_string(),
            endpoint,
            stream_client,
        }
    }
}

impl Generator for OllamaGenerator {
    fn profile(&self) -> GeneratorProfile {
        GeneratorProfile {
            generator_id: OLLAMA_GENERATOR_ID.to_string(),
            model_id: self.model.clone(),
            output_shape: OutputShape::CompletionOnly,
        }
    }

    fn generate(
        &self,
        req: &GenerationRequest,
        cancel: &CancelSignal,
        emit: &mut dyn FnMut(&str),
    ) -> Result<GenerationStatus, GenerationError> {
        req.validate()?;
        let request = self.build_request(req)?;

        if cancel.load(Ordering::Acquire) {
            return Ok(GenerationStatus::Cancelled);
        }

        match self.stream_client.generate(&request, cancel, emit) {
            Ok(()) => Ok(GenerationStatus::Completed),
            Err(OllamaApiError::Cancelled) => Ok(GenerationStatus::Cancelled),
            Err(OllamaApiError::TimedOut) => {
                debug!(model = %self.model, "ollama generation hit its deadline");
                Ok(GenerationStatus::TimedOut)
            }
            Err(error) => Err(map_generation_error(error)),
        }
    }
}

fn map_generation_error(error: OllamaApiError) -> GenerationError {
    match error {
        OllamaApiError::Request(_)
        | OllamaApiError::RetryExhausted { .. }
        | OllamaApiError::Unknown(_) => {
            GenerationError::Transport(format!("ollama request failed: {error}"))
        }
        OllamaApiError::MissingModel | OllamaApiError::InvalidBaseUrl(_) => {
            GenerationError::InvalidRequest(error.to_string())
        }
        other => GenerationError::Protocol(format!("ollama request failed: {other}")),
    }
}

fn map_init_error(error: OllamaApiError) -> GeneratorInitError {
    GeneratorInitError::new(format!("Failed to initialize ollama generator: {error}"))
}
