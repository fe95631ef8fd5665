//! Application state management.

use std::sync::Arc;
use threadscope_browser::PageProvider;
use threadscope_core::AppConfig;
use threadscope_governor::{ConcurrencyGovernor, RateLimiter};
use threadscope_scraper::ThreadsScraper;

/// State shared by every request handler.
pub struct AppState {
    /// Cached, retrying scraper over the shared browser
    pub scraper: ThreadsScraper,

    /// Bounded-concurrency pool and admission gate
    pub governor: Arc<ConcurrencyGovernor>,

    /// Per-client request budget
    pub limiter: RateLimiter,

    /// Hosts accepted in profile URLs
    pub allowed_domains: Vec<String>,
}

impl AppState {
    /// State backed by a real browser. Chromium is launched on first use.
    pub fn new(config: &AppConfig) -> Self {
        Self::from_parts(config, ThreadsScraper::new(config))
    }

    /// State backed by any page provider.
    pub fn with_provider(config: &AppConfig, provider: Arc<dyn PageProvider>) -> Self {
        Self::from_parts(config, ThreadsScraper::with_provider(config, provider))
    }

    /// State around a preconfigured scraper.
    pub fn from_parts(config: &AppConfig, scraper: ThreadsScraper) -> Self {
        Self {
            scraper,
            governor: Arc::new(ConcurrencyGovernor::new(&config.concurrency)),
            limiter: RateLimiter::new(&config.rate_limit),
            allowed_domains: config.site.allowed_domains.clone(),
        }
    }

    /// Replace the governor, e.g. with one using a fixed memory probe.
    #[must_use]
    pub fn with_governor(mut self, governor: Arc<ConcurrencyGovernor>) -> Self {
        self.governor = governor;
        self
    }
}
