//! Shared HTTP plumbing for the embedding, chat, and Weaviate clients.
//!
//! Every outbound call goes through [`send_with_retry`], which applies the
//! per-service timeout configured on the [`reqwest::Client`] and a bounded
//! exponential backoff:
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - network errors and timeouts → retry
//! - any other status → returned to the caller immediately
//! - backoff: `base`, `2·base`, `4·base`, … (exponent capped at 5)

use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;

use crate::error::Error;

/// Retry budget for one logical request.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(5);
        self.base_delay * (1u32 << exp)
    }
}

/// A response that was not retried away: success or a non-retryable status.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode a successful body as JSON; non-2xx becomes [`HttpFailure::Status`].
    pub fn into_json(self) -> Result<serde_json::Value, HttpFailure> {
        if !self.status.is_success() {
            return Err(HttpFailure::Status {
                status: self.status,
                body: self.body,
            });
        }
        serde_json::from_str(&self.body).map_err(|e| HttpFailure::Decode(e.to_string()))
    }
}

/// Why a request ultimately failed.
#[derive(Debug)]
pub enum HttpFailure {
    /// Network error or timeout on the final attempt.
    Transport(String),
    /// Error status on the final attempt, or a non-retryable error status.
    Status { status: StatusCode, body: String },
    /// The body was not the JSON we expected.
    Decode(String),
}

impl HttpFailure {
    /// Map onto the crate taxonomy.
    ///
    /// Transport and auth failures are connection errors; everything else is
    /// an API-level error built by `api_error`.
    pub fn into_error(self, service: &str, api_error: fn(String) -> Error) -> Error {
        match self {
            HttpFailure::Transport(msg) => Error::connection(service, msg),
            HttpFailure::Status { status, body }
                if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN =>
            {
                Error::connection(service, format!("{}: {}", status, body))
            }
            HttpFailure::Status { status, body } => {
                api_error(format!("{} API error {}: {}", service, status, body))
            }
            HttpFailure::Decode(msg) => {
                api_error(format!("invalid {} response: {}", service, msg))
            }
        }
    }
}

/// Build a client with the per-call timeout of one service.
pub fn client(timeout_secs: u64) -> Result<reqwest::Client, Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::connection("http", e))
}

/// Send a request, retrying transient failures according to `policy`.
///
/// `build` is invoked once per attempt so the body is re-serialized each time.
pub async fn send_with_retry<F>(
    label: &str,
    policy: RetryPolicy,
    build: F,
) -> Result<Reply, HttpFailure>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = HttpFailure::Transport(format!("{}: no attempt made", label));

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            tracing::warn!(label, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();

                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::debug!(label, %status, "transient error status");
                    last_err = HttpFailure::Status { status, body };
                    continue;
                }

                return Ok(Reply { status, body });
            }
            Err(e) => {
                tracing::debug!(label, error = %e, "transport error");
                last_err = HttpFailure::Transport(e.to_string());
                continue;
            }
        }
    }

    Err(last_err)
}
