//! The scraper facade.
//!
//! `ThreadsScraper` ties the pieces together: cache lookup, politeness
//! pacing, a retry-wrapped single-page session and snapshot delivery.
//! Admission control and rate limiting are left to the caller.

use crate::cache::{posts_key, profile_key, CacheStats, CachedValue, TtlCache};
use crate::collector::PostCollector;
use crate::hydration::HYDRATION_SCRIPT_SELECTOR;
use crate::pacing::Pacer;
use crate::profile::extract_profile;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::sink::{NoopSink, SnapshotSink};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use threadscope_browser::{
    navigate_to_profile, BrowserEngine, PageGuard, PageProvider, ProfilePage,
};
use threadscope_core::validate::{DEFAULT_POST_LIMIT, MAX_POST_LIMIT};
use threadscope_core::{AppConfig, Handle, Post, Profile, ProfileWithPosts, Result, SiteConfig};
use tokio::task::JoinHandle;

/// Per-call options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeOptions {
    /// Maximum posts to return, clamped to `1..=100`
    pub limit: u32,
    /// Skip the cache read. A fresh result is still written back.
    pub no_cache: bool,
}

impl ScrapeOptions {
    /// Options with the given post limit.
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    fn effective_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_POST_LIMIT)
    }
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_POST_LIMIT,
            no_cache: false,
        }
    }
}

/// High-level scraper for public Threads profiles.
pub struct ThreadsScraper {
    provider: Arc<dyn PageProvider>,
    cache: Option<Arc<TtlCache<CachedValue>>>,
    sweeper: Option<JoinHandle<()>>,
    site: SiteConfig,
    collector: PostCollector,
    pacer: Pacer,
    retry: RetryPolicy,
    selector_wait: Duration,
    sink: Arc<dyn SnapshotSink>,
}

impl ThreadsScraper {
    /// Scraper backed by a Chromium [`BrowserEngine`]. The browser is
    /// launched lazily.
    pub fn new(config: &AppConfig) -> Self {
        let engine: Arc<dyn PageProvider> = Arc::new(BrowserEngine::new(config.browser.clone()));
        Self::with_provider(config, engine)
    }

    /// Scraper backed by any page provider.
    ///
    /// When caching is enabled and a Tokio runtime is available, a
    /// background sweep is started; it stops when the scraper is dropped.
    pub fn with_provider(config: &AppConfig, provider: Arc<dyn PageProvider>) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| Arc::new(TtlCache::new(config.cache.ttl())));

        let sweeper = match (&cache, tokio::runtime::Handle::try_current()) {
            (Some(cache), Ok(_)) => Some(cache.spawn_sweeper(config.cache.sweep_interval())),
            _ => None,
        };

        Self {
            provider,
            cache,
            sweeper,
            site: config.site.clone(),
            collector: PostCollector::new(&config.scraping, &config.site),
            pacer: Pacer::from_config(&config.scraping),
            retry: RetryPolicy::from_config(&config.scraping),
            selector_wait: Duration::from_millis(config.scraping.wait_for_selector_ms),
            sink: Arc::new(NoopSink),
        }
    }

    /// Replace the politeness pacer, including the one used while scrolling.
    #[must_use]
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self.collector.set_pacer(pacer);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn SnapshotSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Launch the browser ahead of the first request.
    pub async fn init(&self) -> Result<()> {
        self.provider.init().await?;
        tracing::info!(cache = self.cache.is_some(), "Scraper initialized");
        Ok(())
    }

    /// Profile metadata for `handle`.
    pub async fn get_profile(&self, handle: &Handle, options: ScrapeOptions) -> Result<Profile> {
        let key = profile_key(handle);
        if let Some(CachedValue::Profile(profile)) = self.cached(&key, options) {
            tracing::debug!(handle = %handle, "Profile served from cache");
            return Ok(profile);
        }

        self.pacer.pause().await;
        let profile = retry_with_backoff(&self.retry, || self.scrape_profile(handle)).await?;

        tracing::info!(handle = %handle, "Scraped profile");
        self.store(key, CachedValue::Profile(profile.clone()));
        self.notify("profile", handle, &profile);
        Ok(profile)
    }

    /// Up to `options.limit` posts for `handle`, in discovery order.
    pub async fn get_posts(&self, handle: &Handle, options: ScrapeOptions) -> Result<Vec<Post>> {
        let limit = options.effective_limit();
        let key = posts_key(handle, limit);
        if let Some(CachedValue::Posts(posts)) = self.cached(&key, options) {
            tracing::debug!(handle = %handle, count = posts.len(), "Posts served from cache");
            return Ok(posts);
        }

        self.pacer.pause().await;
        let posts = retry_with_backoff(&self.retry, || self.scrape_posts(handle, limit)).await?;

        tracing::info!(handle = %handle, count = posts.len(), "Scraped posts");
        self.store(key, CachedValue::Posts(posts.clone()));
        self.notify("posts", handle, &posts);
        Ok(posts)
    }

    /// Profile and posts from a single page load. Both cache keys are
    /// populated.
    pub async fn get_profile_with_posts(
        &self,
        handle: &Handle,
        options: ScrapeOptions,
    ) -> Result<ProfileWithPosts> {
        let limit = options.effective_limit();
        let profile_entry = profile_key(handle);
        let posts_entry = posts_key(handle, limit);

        if let (Some(CachedValue::Profile(profile)), Some(CachedValue::Posts(posts))) = (
            self.cached(&profile_entry, options),
            self.cached(&posts_entry, options),
        ) {
            tracing::debug!(handle = %handle, "Profile with posts served from cache");
            return Ok(ProfileWithPosts { profile, posts });
        }

        self.pacer.pause().await;
        let result = retry_with_backoff(&self.retry, || self.scrape_both(handle, limit)).await?;

        tracing::info!(
            handle = %handle,
            count = result.posts.len(),
            "Scraped profile with posts"
        );
        self.store(profile_entry, CachedValue::Profile(result.profile.clone()));
        self.store(posts_entry, CachedValue::Posts(result.posts.clone()));
        self.notify("profile_with_posts", handle, &result);
        Ok(result)
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
            tracing::info!("Cache cleared");
        }
    }

    /// Cache counters, or `None` when caching is disabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|cache| cache.stats())
    }

    /// Tear down the browser.
    pub async fn close(&self) -> Result<()> {
        self.provider.close().await?;
        tracing::info!("Scraper closed");
        Ok(())
    }

    fn cached(&self, key: &str, options: ScrapeOptions) -> Option<CachedValue> {
        if options.no_cache {
            return None;
        }
        self.cache.as_ref()?.get(key)
    }

    fn store(&self, key: String, value: CachedValue) {
        if let Some(cache) = &self.cache {
            cache.insert(key, value);
        }
    }

    fn notify<T: Serialize>(&self, kind: &'static str, handle: &Handle, data: &T) {
        let data = match serde_json::to_value(data) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(kind, "Failed to serialize snapshot: {}", e);
                return;
            }
        };
        let snapshot = serde_json::json!({
            "handle": handle.as_str(),
            "scrapedAt": Utc::now().to_rfc3339(),
            "data": data,
        });

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            if let Err(e) = sink.record(kind, snapshot).await {
                tracing::warn!(kind, "Snapshot sink failed: {}", e);
            }
        });
    }

    async fn wait_for_hydration(&self, page: &dyn ProfilePage) -> Result<String> {
        if !page
            .wait_for_selector(HYDRATION_SCRIPT_SELECTOR, self.selector_wait)
            .await?
        {
            tracing::debug!("Hydration scripts did not appear before timeout");
        }
        Ok(page.content().await?)
    }

    async fn read_profile(&self, page: &dyn ProfilePage) -> Result<Profile> {
        let html = self.wait_for_hydration(page).await?;
        extract_profile(&html)
    }

    async fn scrape_profile(&self, handle: &Handle) -> Result<Profile> {
        let page = navigate_to_profile(self.provider.as_ref(), handle, &self.site).await?;
        let result = self.read_profile(&*page).await;
        release(page).await;
        result
    }

    async fn scrape_posts(&self, handle: &Handle, limit: u32) -> Result<Vec<Post>> {
        let page = navigate_to_profile(self.provider.as_ref(), handle, &self.site).await?;
        let result = self.collector.collect(&*page, limit).await;
        release(page).await;
        result
    }

    async fn scrape_both(&self, handle: &Handle, limit: u32) -> Result<ProfileWithPosts> {
        let page = navigate_to_profile(self.provider.as_ref(), handle, &self.site).await?;
        let result = tokio::try_join!(
            self.read_profile(&*page),
            self.collector.collect(&*page, limit)
        );
        release(page).await;
        let (profile, posts) = result?;
        Ok(ProfileWithPosts { profile, posts })
    }
}

impl Drop for ThreadsScraper {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

async fn release(page: PageGuard) {
    if let Err(e) = page.close().await {
        tracing::warn!("Failed to close page: {}", e);
    }
}
