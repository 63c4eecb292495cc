//! Retry with exponential backoff plus jitter for API requests

use std::time::Duration;

use rand::Rng;

use crate::clock::Clock;
use crate::error::RequestError;

/// Bounded retry budget for one logical request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles every attempt
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to each delay
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff without jitter: base * 2^(attempt-1) (1s, 2s, 4s, ...)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Backoff for `attempt` plus uniform jitter in `[0, max_jitter]`
    pub fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.backoff(attempt) + jitter
    }
}

/// Retry a fallible request with exponential backoff.
///
/// Retryable errors sleep on `clock` and try again, up to `policy.max_retries`
/// times. Rate-limit errors skip the backoff sleep because the governor waits
/// on the next `admit()`.
///
/// Returns `Ok(T)` on first success, or the final `Err` on exhaustion / non-retryable error.
pub fn retry_with_backoff<T>(
    label: &str,
    policy: &RetryPolicy,
    clock: &dyn Clock,
    mut attempt_fn: impl FnMut() -> Result<T, RequestError>,
) -> Result<T, RequestError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < policy.max_retries && e.is_retryable() => {
                attempt += 1;
                let delay = e
                    .retry_delay()
                    .unwrap_or_else(|| policy.backoff_with_jitter(attempt));
                log::debug!(
                    "{label}: attempt {attempt}/{} failed: {e}, retrying in {delay:?}",
                    policy.max_retries
                );
                clock.sleep(delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    log::warn!("{label}: giving up after {} attempts: {e}", attempt + 1);
                }
                return Err(e);
            }
        }
    }
}
