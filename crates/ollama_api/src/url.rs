use crate::config::OllamaEndpoint;

/// Default server root for a local Ollama daemon.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Resolve the full endpoint URL for a base URL.
///
/// Normalization rules:
/// 1) an empty base falls back to [`DEFAULT_OLLAMA_BASE_URL`]
/// 2) trailing slashes and a trailing `/api` segment are dropped
/// 3) the endpoint path (`/api/chat` or `/api/generate`) is appended
pub fn endpoint_url(base_url: &str, endpoint: OllamaEndpoint) -> String {
    let base = if base_url.trim().is_empty() {
        DEFAULT_OLLAMA_BASE_URL
    } else {
        base_url.trim()
    };

    let mut trimmed = base.trim_end_matches('/');
    for suffix in [OllamaEndpoint::Chat.path(), OllamaEndpoint::Generate.path()] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            trimmed = stripped;
        }
    }
    let trimmed = trimmed.strip_suffix("/api").unwrap_or(trimmed);
    format!("{trimmed}{}", endpoint.path())
}
