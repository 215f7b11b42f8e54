//! Shared HTTP retry wrapper with 429/5xx handling and Retry-After support.
//!
//! `send_with_retry()` replaces `client.execute(request)` for provider calls:
//! - Exponential backoff with jitter on 429 (Too Many Requests) and 5xx errors
//! - Retry-After header parsing (seconds)
//! - Transparent passthrough for non-retryable status codes (4xx except 429)

use reqwest::{Client, Request, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for HTTP retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryConfig {
    /// Maximum number of retry attempts (default: 3)
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff (default: 1000)
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Backoff multiplier (default: 2.0)
    pub backoff_multiplier: f64,
}

impl Default for HttpRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Determine if a status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Parse a numeric Retry-After header
fn parse_retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get("retry-after")?.to_str().ok()?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(300)))
}

/// Delay before retry `attempt` (0-based), capped and with 10-30% jitter
pub(crate) fn calculate_delay(attempt: u32, config: &HttpRetryConfig) -> Duration {
    let base = config.base_delay_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_delay_ms as f64);
    let jitter = capped * (0.1 + rand::random::<f64>() * 0.2);
    Duration::from_millis((capped + jitter) as u64)
}

/// Send a request, retrying on 429/5xx.
///
/// Requests whose body cannot be cloned are sent once.
pub async fn send_with_retry(
    client: &Client,
    request: Request,
    config: &HttpRetryConfig,
) -> Result<Response, reqwest::Error> {
    let mut pending = request;
    let mut attempt = 0u32;

    loop {
        let spare = if attempt < config.max_retries {
            pending.try_clone()
        } else {
            None
        };
        let method = pending.method().clone();
        let url = pending.url().clone();

        let response = client.execute(pending).await?;
        let status = response.status().as_u16();

        let next = match spare {
            Some(next) if is_retryable_status(status) => next,
            _ => return Ok(response),
        };

        let delay = parse_retry_after(&response).unwrap_or_else(|| calculate_delay(attempt, config));
        tracing::debug!(
            "HTTP {} {} returned {}. Retry {}/{} after {:?}",
            method, url.path(), status, attempt + 1, config.max_retries, delay
        );
        drop(response);

        tokio::time::sleep(delay).await;
        pending = next;
        attempt += 1;
    }
}
