//! Politeness delays between page interactions.

use rand::Rng;
use std::time::Duration;
use threadscope_core::ScrapingConfig;

/// Jittered delay source.
///
/// A base delay is drawn uniformly from `[min, max]` and then moved by up
/// to `jitter_percent` percent in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    min: Duration,
    max: Duration,
    jitter_percent: u32,
}

impl Pacer {
    /// Bounds are reordered if given backwards; jitter is capped at 100%.
    #[must_use]
    pub fn new(min: Duration, max: Duration, jitter_percent: u32) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            jitter_percent: jitter_percent.min(100),
        }
    }

    /// Pacer built from the scraping section of the config.
    #[must_use]
    pub fn from_config(config: &ScrapingConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.jitter_percent,
        )
    }

    /// A pacer that never waits. Used by tests.
    #[must_use]
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0)
    }

    /// Draw the next delay.
    pub fn next_delay(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let min = self.min.as_secs_f64();
        let max = self.max.as_secs_f64();
        let base = if max > min {
            rng.gen_range(min..=max)
        } else {
            min
        };

        let spread = base * f64::from(self.jitter_percent) / 100.0;
        let jitter = if spread > 0.0 {
            rng.gen_range(-spread..=spread)
        } else {
            0.0
        };

        Duration::from_secs_f64((base + jitter).max(0.0))
    }

    /// Sleep for [`Pacer::next_delay`] and return how long it was.
    pub async fn pause(&self) -> Duration {
        let delay = self.next_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        delay
    }
}

impl Default for Pacer {
    fn default() -> Self {
        Self::from_config(&ScrapingConfig::default())
    }
}
