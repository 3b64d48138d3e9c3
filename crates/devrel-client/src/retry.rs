//! Bounded retry for outgoing requests.

use devrel_core::error::{DevRelError, Result};
use reqwest::{RequestBuilder, Response};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Wait before retry `n` is `delay * n`.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

/// Send `req`, retrying transport errors and 5xx responses with linear
/// backoff. Any other response, 4xx included, is returned as is. The last
/// 5xx response is returned once attempts run out.
pub async fn fetch_with_retry(req: RequestBuilder, policy: &RetryPolicy) -> Result<Response> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        // Streaming bodies cannot be cloned; those get a single attempt.
        let (current, next) = match req.try_clone() {
            Some(copy) if attempt < attempts => (copy, true),
            Some(copy) => (copy, false),
            None => return req.send().await.map_err(|e| DevRelError::Http(format!("Request failed: {e}"))),
        };
        match current.send().await {
            Ok(resp) if resp.status().is_server_error() && next => {
                tracing::warn!("Attempt {}/{}: server returned {}", attempt, attempts, resp.status());
            }
            Ok(resp) => return Ok(resp),
            Err(e) if next => {
                tracing::warn!("Attempt {}/{}: {}", attempt, attempts, e);
            }
            Err(e) => {
                return Err(DevRelError::Http(format!(
                    "Request failed after {attempts} attempt(s): {e}"
                )));
            }
        }
        tokio::time::sleep(policy.delay * attempt).await;
        attempt += 1;
    }
}
