use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use crate::error::GenerationError;

/// Sleeps between retry attempts. Swapped out in tests to record waits.
#[async_trait]
pub trait BackoffTimer: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioTimer;

#[async_trait]
impl BackoffTimer for TokioTimer {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Statuses worth another attempt: rate limiting and temporary overload.
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// Wait before retry number `retry` (1-based): 2, 4, 8... seconds.
pub fn backoff_delay(retry: u32) -> Duration {
    Duration::from_secs(1u64 << retry.min(16))
}

/// Runs a request closure up to `max_attempts` times.
/// Retries only on 429 and 503, waiting `2^n` seconds before retry `n`.
/// There is no wait after the final attempt.
///
/// Returns the first non-retryable response (success or not), `Overloaded`
/// once every attempt was a 429/503, or `Network` on a transport failure,
/// which is never retried.
pub async fn request_with_backoff<F, Fut>(
    mut task: F,
    max_attempts: u32,
    timer: &dyn BackoffTimer,
) -> Result<reqwest::Response, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        let response = task().await.map_err(|e| {
            tracing::error!("[HTTP] Request failed on attempt {}: {}", attempt, e);
            GenerationError::Network(e.to_string())
        })?;

        let status = response.status();
        if !is_retryable(status) {
            return Ok(response);
        }
        if attempt >= max_attempts {
            tracing::error!(
                "[HTTP] Still {} after {} attempts, giving up",
                status,
                attempt
            );
            return Err(GenerationError::Overloaded { attempts: attempt });
        }

        let delay = backoff_delay(attempt);
        tracing::warn!(
            "[HTTP] Request failed with status {}, retrying in {:?} (attempt {}/{})",
            status,
            delay,
            attempt,
            max_attempts
        );
        timer.sleep(delay).await;
    }
}
