//! Bounded retry of completion calls with exponential backoff.

use crate::error::{Error, Result};
use crate::provider::{self, ChatRequest, Completion, LlmApi};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Attempt limits, backoff and per-call deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap for both computed and server-requested delays.
    pub max_delay: Duration,
    /// Deadline for one completion call.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    ///
    /// Doubles from `base_delay`, unless the server asked for a specific wait.
    #[must_use]
    pub fn delay_for(&self, retry: u32, server_retry_after: Option<u64>) -> Duration {
        let delay = match server_retry_after {
            Some(secs) => Duration::from_secs(secs),
            None => self
                .base_delay
                .saturating_mul(1u32 << retry.saturating_sub(1).min(16)),
        };
        delay.min(self.max_delay)
    }
}

/// Classify a retryable error, returning the category if retryable.
///
/// Returns `Some(category)` for transient errors that should be retried,
/// `None` for non-retryable errors.
pub(crate) fn retryable_category(err: &str) -> Option<&'static str> {
    let err_lower = err.to_lowercase();

    // An explicit status code decides on its own
    if let Some(status) = http_status(err) {
        return match status {
            429 => Some("Rate limited"),
            408 => Some("Request timed out"),
            500..=599 => Some("Server error"),
            _ => None,
        };
    }

    if err_lower.contains("rate limit") {
        return Some("Rate limited");
    }

    if err_lower.contains("timeout")
        || err_lower.contains("timed out")
        || err_lower.contains("deadline exceeded")
    {
        return Some("Request timed out");
    }

    if err_lower.contains("connection")
        || err_lower.contains("network")
        || err_lower.contains("dns")
        || err_lower.contains("resolve")
    {
        return Some("Network error");
    }

    if err_lower.contains("server error")
        || err_lower.contains("internal error")
        || err_lower.contains("service unavailable")
        || err_lower.contains("bad gateway")
        || err_lower.contains("overloaded")
    {
        return Some("Server error");
    }

    None
}

static HTTP_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bHTTP (\d{3})\b").expect("HTTP_STATUS must be a valid regex"));

fn http_status(err: &str) -> Option<u16> {
    HTTP_STATUS.captures(err)?.get(1)?.as_str().parse().ok()
}

/// Category of a provider failure worth retrying.
pub(crate) fn transient_reason(err: &provider::Error) -> Option<&'static str> {
    match err {
        provider::Error::RateLimited { .. } => Some("Rate limited"),
        provider::Error::Timeout(_) => Some("Request timed out"),
        provider::Error::Http(e) if e.is_timeout() => Some("Request timed out"),
        provider::Error::Http(e) if e.is_connect() => Some("Network error"),
        provider::Error::MissingApiKey { .. } | provider::Error::EmptyResponse(_) => None,
        other => retryable_category(&other.to_string()),
    }
}

/// Run one completion, retrying transient failures per `policy`.
///
/// Cancellation interrupts both the call and the backoff sleep.
pub(crate) async fn complete_with_retry(
    provider: &dyn LlmApi,
    request: &ChatRequest,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    chunk_index: usize,
) -> Result<Completion> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        debug!(
            "Chunk {} completion attempt {}/{} (provider: {})",
            chunk_index,
            attempt,
            max_attempts,
            provider.id()
        );

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            result = tokio::time::timeout(policy.timeout, provider.complete(request.clone())) => {
                result.unwrap_or(Err(provider::Error::Timeout(policy.timeout)))
            }
        };

        let err = match result {
            Ok(completion) => return Ok(completion),
            Err(e) => e,
        };

        let Some(reason) = transient_reason(&err) else {
            return Err(Error::Service {
                chunk_index,
                source: err,
            });
        };

        if attempt >= max_attempts {
            return Err(Error::TransientService {
                chunk_index,
                attempts: attempt,
                source: err,
            });
        }

        let delay = policy.delay_for(attempt, err.retry_after());
        warn!(
            "{}, retrying in {:?} (attempt {}/{})",
            reason, delay, attempt, max_attempts
        );

        tokio::select! {
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}
