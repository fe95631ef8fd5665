//! Facade behavior: caching, retries, page cleanup and snapshots.

mod common;

use async_trait::async_trait;
use common::{dom_post, hydration_page, profile_blob, ScriptedProvider};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadscope_browser::BrowserError;
use threadscope_core::{AppConfig, Handle, ScrapeError};
use threadscope_scraper::{Pacer, RetryPolicy, ScrapeOptions, SnapshotSink, ThreadsScraper};
use tokio_test::assert_ok;

fn scraper(provider: &Arc<ScriptedProvider>) -> ThreadsScraper {
    ThreadsScraper::with_provider(&AppConfig::default(), provider.clone()).with_pacer(Pacer::none())
}

fn alice() -> Handle {
    Handle::parse("@alice").expect("valid handle")
}

#[tokio::test(start_paused = true)]
async fn scrapes_alice_posts_with_dom_fallback() {
    let initial = hydration_page(&["P1", "P2", "P3"]);
    let scrolled = format!("{initial}{}{}", dom_post("P3"), dom_post("P4"));
    let provider = Arc::new(ScriptedProvider::profile(vec![initial, scrolled]));
    let scraper = scraper(&provider);

    let posts = scraper
        .get_posts(&alice(), ScrapeOptions::with_limit(5))
        .await
        .expect("posts scraped");

    assert_eq!(posts.len(), 4);
    assert_eq!(provider.stats.opened(), 1);
    assert_eq!(provider.stats.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn cache_hit_within_ttl_and_refresh_after_expiry() {
    let provider = Arc::new(ScriptedProvider::profile(vec![hydration_page(&["P1"])]));
    let scraper = scraper(&provider);
    let options = ScrapeOptions::with_limit(1);

    let first = scraper.get_posts(&alice(), options).await.expect("first scrape");
    tokio::time::advance(Duration::from_secs(60)).await;
    let second = scraper.get_posts(&alice(), options).await.expect("cached");

    assert_eq!(first, second);
    assert_eq!(provider.stats.opened(), 1);

    tokio::time::advance(Duration::from_secs(241)).await;
    scraper.get_posts(&alice(), options).await.expect("rescrape");
    assert_eq!(provider.stats.opened(), 2);

    let stats = scraper.cache_stats().expect("cache enabled");
    assert_eq!(stats.keys, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test(start_paused = true)]
async fn no_cache_bypasses_the_read() {
    let provider = Arc::new(ScriptedProvider::profile(vec![hydration_page(&["P1"])]));
    let scraper = scraper(&provider);

    scraper
        .get_posts(&alice(), ScrapeOptions::with_limit(1))
        .await
        .expect("first scrape");
    let options = ScrapeOptions {
        limit: 1,
        no_cache: true,
    };
    scraper.get_posts(&alice(), options).await.expect("bypass");
    assert_eq!(provider.stats.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn different_limits_use_different_keys() {
    let provider = Arc::new(ScriptedProvider::profile(vec![hydration_page(&["P1", "P2"])]));
    let scraper = scraper(&provider);

    scraper.get_posts(&alice(), ScrapeOptions::with_limit(1)).await.expect("limit 1");
    scraper.get_posts(&alice(), ScrapeOptions::with_limit(2)).await.expect("limit 2");
    assert_eq!(provider.stats.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn missing_profile_is_not_retried_or_cached() {
    let provider = Arc::new(ScriptedProvider::new(
        "Page not found • Threads",
        vec![profile_blob()],
    ));
    let scraper = scraper(&provider);

    let result = scraper.get_profile(&alice(), ScrapeOptions::default()).await;

    assert!(matches!(result, Err(ScrapeError::NotFound(_))));
    assert_eq!(provider.stats.opened(), 1);
    assert_eq!(provider.stats.closed(), 1);
    assert_eq!(scraper.cache_stats().expect("cache enabled").keys, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_navigation_failure_is_retried() {
    let provider = Arc::new(
        ScriptedProvider::profile(vec![profile_blob()])
            .failing_first(BrowserError::NavigationError("connection reset".to_string())),
    );
    let scraper = scraper(&provider);

    let started = tokio::time::Instant::now();
    let profile = scraper
        .get_profile(&alice(), ScrapeOptions::default())
        .await
        .expect("second attempt succeeds");

    assert_eq!(profile.username, "alice");
    assert_eq!(profile.post_count, Some(3));
    assert_eq!(provider.stats.opened(), 2);
    assert!(started.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_return_last_error() {
    let provider = Arc::new(
        ScriptedProvider::profile(vec![profile_blob()])
            .failing_first(BrowserError::Timeout("1".to_string()))
            .failing_first(BrowserError::Timeout("2".to_string())),
    );
    let scraper = scraper(&provider).with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(10),
    });

    match scraper.get_profile(&alice(), ScrapeOptions::default()).await {
        Err(ScrapeError::Timeout(msg)) => assert_eq!(msg, "2"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(provider.stats.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn profile_with_posts_fills_both_cache_keys() {
    let document = format!("{}{}", profile_blob(), hydration_page(&["P1", "P2"]));
    let provider = Arc::new(ScriptedProvider::profile(vec![document]));
    let scraper = scraper(&provider);
    let options = ScrapeOptions::with_limit(2);

    let both = scraper
        .get_profile_with_posts(&alice(), options)
        .await
        .expect("scraped");
    assert_eq!(both.profile.username, "alice");
    assert_eq!(both.posts.len(), 2);

    let profile = scraper.get_profile(&alice(), options).await.expect("cached profile");
    let posts = scraper.get_posts(&alice(), options).await.expect("cached posts");
    assert_eq!(profile, both.profile);
    assert_eq!(posts, both.posts);
    assert_eq!(provider.stats.opened(), 1);
    assert_eq!(provider.stats.closed(), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_cache_forces_rescrape() {
    let provider = Arc::new(ScriptedProvider::profile(vec![profile_blob()]));
    let scraper = scraper(&provider);

    assert_ok!(scraper.get_profile(&alice(), ScrapeOptions::default()).await);
    scraper.clear_cache();
    assert_ok!(scraper.get_profile(&alice(), ScrapeOptions::default()).await);
    assert_eq!(provider.stats.opened(), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_cache_always_scrapes() {
    let provider = Arc::new(ScriptedProvider::profile(vec![profile_blob()]));
    let mut config = AppConfig::default();
    config.cache.enabled = false;
    let scraper =
        ThreadsScraper::with_provider(&config, provider.clone()).with_pacer(Pacer::none());

    assert_ok!(scraper.get_profile(&alice(), ScrapeOptions::default()).await);
    assert_ok!(scraper.get_profile(&alice(), ScrapeOptions::default()).await);
    assert_eq!(provider.stats.opened(), 2);
    assert!(scraper.cache_stats().is_none());
}

#[derive(Default)]
struct RecordingSink {
    snapshots: Mutex<Vec<(String, Value)>>,
}

#[async_trait]
impl SnapshotSink for RecordingSink {
    async fn record(&self, kind: &str, snapshot: Value) -> threadscope_core::Result<()> {
        self.snapshots
            .lock()
            .expect("lock")
            .push((kind.to_string(), snapshot));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn successful_scrape_reaches_the_sink() {
    let provider = Arc::new(ScriptedProvider::profile(vec![profile_blob()]));
    let sink = Arc::new(RecordingSink::default());
    let scraper = scraper(&provider).with_sink(sink.clone());

    scraper.get_profile(&alice(), ScrapeOptions::default()).await.expect("scraped");
    tokio::time::sleep(Duration::from_millis(10)).await;

    let snapshots = sink.snapshots.lock().expect("lock");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].0, "profile");
    assert_eq!(snapshots[0].1["handle"], "alice");
    assert_eq!(snapshots[0].1["data"]["username"], "alice");
}
