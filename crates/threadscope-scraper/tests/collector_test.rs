//! Post collection against scripted pages.

mod common;

use common::{dom_post, hydration_page, ScriptedPage, PageStats};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use threadscope_core::{ScrapeError, ScrapingConfig, SiteConfig};
use threadscope_scraper::{Pacer, PostCollector};

fn collector(scraping: &ScrapingConfig) -> PostCollector {
    PostCollector::new(scraping, &SiteConfig::default()).with_pacer(Pacer::none())
}

fn page(documents: Vec<String>) -> (ScriptedPage, Arc<PageStats>) {
    let stats = Arc::new(PageStats::default());
    let page = ScriptedPage::new("Alice (@alice) • Threads", documents, Arc::clone(&stats));
    (page, stats)
}

fn ids(posts: &[threadscope_core::Post]) -> Vec<&str> {
    posts.iter().map(|p| p.id.as_str()).collect()
}

#[tokio::test(start_paused = true)]
async fn hydration_and_dom_merge_without_duplicates() {
    let initial = hydration_page(&["P1", "P2", "P3"]);
    let scrolled = format!("{initial}{}{}", dom_post("P3"), dom_post("P4"));
    let (page, stats) = page(vec![initial, scrolled]);

    let posts = collector(&ScrapingConfig::default())
        .collect(&page, 5)
        .await
        .expect("collects");

    assert_eq!(ids(&posts), vec!["P1", "P2", "P3", "P4"]);
    assert_eq!(posts[3].text.as_deref(), Some("dom P4"));
    assert_eq!(
        posts[3].url.as_deref(),
        Some("https://www.threads.net/@alice/post/P4")
    );
    // one productive round, then three stale ones
    assert_eq!(stats.scrolls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn result_is_truncated_to_limit() {
    let all: Vec<String> = (0..10).map(|i| format!("P{i}")).collect();
    let refs: Vec<&str> = all.iter().map(String::as_str).collect();
    let (page, stats) = page(vec![hydration_page(&refs)]);

    let posts = collector(&ScrapingConfig::default())
        .collect(&page, 4)
        .await
        .expect("collects");

    assert_eq!(ids(&posts), vec!["P0", "P1", "P2", "P3"]);
    assert_eq!(stats.scrolls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn limit_is_capped_at_one_hundred() {
    let all: Vec<String> = (0..150).map(|i| format!("P{i}")).collect();
    let refs: Vec<&str> = all.iter().map(String::as_str).collect();
    let (page, _) = page(vec![hydration_page(&refs)]);

    let posts = collector(&ScrapingConfig::default())
        .collect(&page, 1000)
        .await
        .expect("collects");
    assert_eq!(posts.len(), 100);
}

#[tokio::test(start_paused = true)]
async fn stops_after_stability_threshold() {
    let (page, stats) = page(vec!["<html><body>nothing yet</body></html>".to_string()]);

    let posts = collector(&ScrapingConfig::default())
        .collect(&page, 10)
        .await
        .expect("collects");

    assert!(posts.is_empty());
    assert_eq!(stats.scrolls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn stops_after_max_rounds() {
    let documents = vec![
        hydration_page(&["P0"]),
        hydration_page(&["P0", "P1"]),
        hydration_page(&["P0", "P1", "P2"]),
        hydration_page(&["P0", "P1", "P2", "P3"]),
    ];
    let (page, stats) = page(documents);
    let scraping = ScrapingConfig {
        max_scroll_rounds: 2,
        ..ScrapingConfig::default()
    };

    let posts = collector(&scraping).collect(&page, 100).await.expect("collects");

    assert_eq!(ids(&posts), vec!["P0", "P1", "P2"]);
    assert_eq!(stats.scrolls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn private_profile_is_forbidden() {
    let (page, _) = page(vec!["<main>This account is private</main>".to_string()]);

    let result = collector(&ScrapingConfig::default()).collect(&page, 10).await;
    assert!(matches!(result, Err(ScrapeError::Forbidden(_))));
}
