use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::error::{parse_error_message, OllamaApiError};
use crate::ndjson::{NdjsonStreamParser, OllamaChunk};
use crate::payload::OllamaRequest;
use crate::retry::{is_retryable_http_error, retry_delay};
use crate::url::endpoint_url;

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug)]
pub struct OllamaClient {
    http: Client,
    config: OllamaConfig,
}

/// Cutoffs that bound one call.
#[derive(Debug, Clone, Copy)]
struct Limits<'a> {
    cancellation: Option<&'a CancellationSignal>,
    deadline: Option<Instant>,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, OllamaApiError> {
        if config.model.trim().is_empty() {
            return Err(OllamaApiError::MissingModel);
        }
        let endpoint = endpoint_url(&config.base_url, config.endpoint);
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(OllamaApiError::InvalidBaseUrl(config.base_url.clone()));
        }
        let http = Client::builder().build().map_err(OllamaApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &OllamaConfig {
        &self.config
    }

    pub fn endpoint_for(&self, request: &OllamaRequest) -> String {
        endpoint_url(&self.config.base_url, request.endpoint())
    }

    pub fn build_request(&self, request: &OllamaRequest) -> reqwest::RequestBuilder {
        self.http.post(self.endpoint_for(request)).json(request)
    }

    fn limits<'a>(&self, cancellation: Option<&'a CancellationSignal>) -> Limits<'a> {
        Limits {
            cancellation,
            deadline: self.config.timeout.map(|timeout| Instant::now() + timeout),
        }
    }

    async fn send_with_retry(
        &self,
        request: &OllamaRequest,
        limits: Limits<'_>,
    ) -> Result<Response, OllamaApiError> {
        let mut last_status: Option<StatusCode> = None;
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            let response = await_within(self.build_request(request).send(), limits)
                .await?
                .map_err(OllamaApiError::from);

            let reason = match response {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    last_status = Some(status);
                    let body = await_within(response.text(), limits)
                        .await?
                        .unwrap_or_default();
                    let message = parse_error_message(status, &body);
                    last_error = Some(message.clone());

                    if !is_retryable_http_error(status.as_u16(), &body) {
                        return Err(OllamaApiError::Status(status, message));
                    }
                    if attempt == self.config.max_retries {
                        return Err(OllamaApiError::Status(status, message));
                    }
                    message
                }
                Err(error) => {
                    let message = error.to_string();
                    last_error = Some(message.clone());
                    message
                }
            };

            if attempt < self.config.max_retries {
                let delay = retry_delay(self.config.retry_base_delay, attempt);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "retrying ollama request"
                );
                await_within(tokio::time::sleep(delay), limits).await?;
            }
        }

        Err(OllamaApiError::RetryExhausted {
            status: last_status,
            last_error,
        })
    }

    /// Sends `request` and hands each text delta to `on_delta` as it arrives.
    ///
    /// Non-streaming requests deliver their whole text as one delta. On
    /// [`OllamaApiError::Cancelled`] or [`OllamaApiError::TimedOut`] the deltas
    /// already delivered remain valid output.
    pub async fn generate_with_handler<F>(
        &self,
        request: &OllamaRequest,
        cancellation: Option<&CancellationSignal>,
        mut on_delta: F,
    ) -> Result<(), OllamaApiError>
    where
        F: FnMut(&str),
    {
        let limits = self.limits(cancellation);
        debug!(
            model = request.model(),
            stream = request.is_stream(),
            endpoint = %self.endpoint_for(request),
            "sending ollama request"
        );
        let response = self.send_with_retry(request, limits).await?;

        if !request.is_stream() {
            let body = await_within(response.bytes(), limits).await??;
            let value: Value = serde_json::from_slice(&body)?;
            let chunk = OllamaChunk::from_value(&value).ok_or_else(|| {
                OllamaApiError::MalformedResponse("response body is not a JSON object".to_owned())
            })?;
            if let Some(error) = chunk.error {
                return Err(OllamaApiError::StreamFailed(error));
            }
            on_delta(&chunk.content);
            return Ok(());
        }

        let mut bytes = response.bytes_stream();
        let mut parser = NdjsonStreamParser::default();

        loop {
            let Some(chunk) = await_within(bytes.next(), limits).await? else {
                break;
            };
            let chunk = chunk.map_err(OllamaApiError::from)?;
            for item in parser.feed(&chunk) {
                if process_chunk(item, &mut on_delta)? {
                    return Ok(());
                }
            }
        }

        for item in parser.finish() {
            if process_chunk(item, &mut on_delta)? {
                return Ok(());
            }
        }

        if parser.malformed_lines() > 0 {
            warn!(
                malformed = parser.malformed_lines(),
                "ignored malformed ndjson lines"
            );
        }
        Err(OllamaApiError::MalformedResponse(
            "stream ended without a done marker".to_owned(),
        ))
    }

    /// Collects the full response text.
    pub async fn generate(
        &self,
        request: &OllamaRequest,
        cancellation: Option<&CancellationSignal>,
    ) -> Result<String, OllamaApiError> {
        let mut text = String::new();
        self.generate_with_handler(request, cancellation, |delta| text.push_str(delta))
            .await?;
        Ok(text)
    }
}

/// Forwards one chunk; returns true once the server marked the response done.
fn process_chunk<F>(chunk: OllamaChunk, on_delta: &mut F) -> Result<bool, OllamaApiError>
where
    F: FnMut(&str),
{
    if let Some(error) = chunk.error {
        return Err(OllamaApiError::StreamFailed(error));
    }
    if !chunk.content.is_empty() {
        on_delta(&chunk.content);
    }
    Ok(chunk.done)
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

async fn await_within<F>(future: F, limits: Limits<'_>) -> Result<F::Output, OllamaApiError>
where
    F: Future,
{
    if limits.cancellation.is_none() && limits.deadline.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(limits.cancellation) {
            return Err(OllamaApiError::Cancelled);
        }

        let mut slice = CANCEL_POLL_INTERVAL;
        if let Some(deadline) = limits.deadline {
            let now = Instant::now();
            if now >= deadline {
                return Err(OllamaApiError::TimedOut);
            }
            slice = slice.min(deadline - now);
        }

        if let Ok(output) = tokio::time::timeout(slice, &mut future).await {
            if is_cancelled(limits.cancellation) {
                return Err(OllamaApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
