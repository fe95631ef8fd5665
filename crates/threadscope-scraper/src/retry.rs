use std::future::Future;
use std::time::Duration;
use threadscope_core::{Result, ScrapingConfig};
use tracing::{error, warn};

/// Exponential backoff policy for whole scrape attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy built from the scraping section of the config.
    #[must_use]
    pub fn from_config(config: &ScrapingConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the `attempt`-th failure (1-based): `base * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScrapingConfig::default())
    }
}

/// Run `task_fn` until it succeeds, fails permanently or runs out of attempts.
///
/// Errors for which [`threadscope_core::ScrapeError::is_retryable`] is false
/// are returned immediately. After the last attempt the last error is
/// returned.
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut task_fn: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match task_fn().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        "Task failed after {} attempts (max: {}): {}",
                        attempt, max_attempts, e
                    );
                    return Err(e);
                }

                let delay = policy.backoff_delay(attempt);
                warn!(
                    "Task failed on attempt {}/{}: {}. Retrying in {:?}...",
                    attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
