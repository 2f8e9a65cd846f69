//! Transport-only client for a local Ollama-style HTTP generation endpoint.
//!
//! This crate owns request payloads, endpoint URLs, NDJSON stream parsing and
//! the retrying, cancellable HTTP client. It has no knowledge of prompts,
//! thinking tags, or reasoning strategies.

pub mod client;
pub mod config;
pub mod error;
pub mod ndjson;
pub mod payload;
pub mod retry;
pub mod url;

pub use client::{CancellationSignal, OllamaClient};
pub use config::{OllamaConfig, OllamaEndpoint};
pub use error::OllamaApiError;
pub use ndjson::{NdjsonStreamParser, OllamaChunk};
pub use payload::{ChatMessage, ChatRequest, GenerateOptions, GenerateRequest, OllamaRequest};
pub use url::endpoint_url;
