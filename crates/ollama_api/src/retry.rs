use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

/// Maximum retry attempts after an initial request attempt.
pub const MAX_RETRIES: u32 = 3;
/// Base delay before the first retry.
pub const BASE_DELAY_MS: u64 = 1000;

fn retryable_error_regex() -> Option<&'static Regex> {
    static CACHED: OnceLock<Option<Regex>> = OnceLock::new();
    CACHED
        .get_or_init(|| {
            Regex::new(
                r"(?i)rate.?limit|overloaded|service.?unavailable|connection.?(refused|reset|closed)|server busy|try again",
            )
            .ok()
        })
        .as_ref()
}

/// Retry policy for transient failures and retryable statuses.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
        || retryable_error_regex().is_some_and(|regex| regex.is_match(error_text))
}

/// Compute exponential backoff delay for a retry attempt.
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.min(30);
    base.saturating_mul(2u32.saturating_pow(exponent))
}
