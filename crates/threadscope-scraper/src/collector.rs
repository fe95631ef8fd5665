//! Scroll-and-rescan post collection on an open profile page.

use crate::dom::extract_dom_posts;
use crate::hydration::{self, HYDRATION_SCRIPT_SELECTOR};
use crate::pacing::Pacer;
use crate::posts::extract_posts_from_hydration;
use crate::profile::ensure_accessible;
use std::collections::HashSet;
use std::time::Duration;
use threadscope_browser::ProfilePage;
use threadscope_core::validate::MAX_POST_LIMIT;
use threadscope_core::{Post, Result, ScrapingConfig, SiteConfig};

/// Control that asks the feed for another page of posts.
pub const LOAD_MORE_SELECTOR: &str = r#"[aria-label*="Load more"]"#;

/// Posts merged by id, kept in discovery order.
#[derive(Debug, Default)]
pub struct PostSet {
    seen: HashSet<String>,
    posts: Vec<Post>,
}

impl PostSet {
    /// Merge `posts`, returning how many were new.
    pub fn merge(&mut self, posts: impl IntoIterator<Item = Post>) -> usize {
        let before = self.posts.len();
        for post in posts {
            if self.seen.insert(post.id.clone()) {
                self.posts.push(post);
            }
        }
        self.posts.len() - before
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// The first `limit` posts.
    pub fn into_truncated(mut self, limit: usize) -> Vec<Post> {
        self.posts.truncate(limit);
        self.posts
    }
}

/// Collects posts from a profile page until a limit or a plateau is reached.
#[derive(Debug, Clone)]
pub struct PostCollector {
    pacer: Pacer,
    base_url: String,
    stability_threshold: u32,
    max_rounds: u32,
    settle_delay: Duration,
    selector_wait: Duration,
}

impl PostCollector {
    pub fn new(scraping: &ScrapingConfig, site: &SiteConfig) -> Self {
        Self {
            pacer: Pacer::from_config(scraping),
            base_url: site.base_url.clone(),
            stability_threshold: scraping.stability_threshold.max(1),
            max_rounds: scraping.max_scroll_rounds,
            settle_delay: Duration::from_millis(scraping.scroll_settle_ms),
            selector_wait: Duration::from_millis(scraping.wait_for_selector_ms),
        }
    }

    #[must_use]
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.set_pacer(pacer);
        self
    }

    /// Replace the pacer used between scroll rounds.
    pub fn set_pacer(&mut self, pacer: Pacer) {
        self.pacer = pacer;
    }

    pub(crate) fn pacer(&self) -> Pacer {
        self.pacer
    }

    /// Collect up to `limit` posts (capped at 100) in discovery order.
    ///
    /// Failures reading the page before the first batch propagate. Inside
    /// the scroll loop every page interaction is best-effort.
    pub async fn collect(&self, page: &dyn ProfilePage, limit: u32) -> Result<Vec<Post>> {
        let limit = limit.min(MAX_POST_LIMIT) as usize;

        if !page
            .wait_for_selector(HYDRATION_SCRIPT_SELECTOR, self.selector_wait)
            .await?
        {
            tracing::debug!("Hydration scripts did not appear before timeout");
        }

        let html = page.content().await?;
        let mut set = PostSet::default();
        set.merge(extract_posts_from_hydration(&hydration::parse_document(&html)));
        if set.is_empty() {
            ensure_accessible(&html)?;
        }
        tracing::debug!(found = set.len(), "Posts from initial load");

        let mut stale_rounds = 0;
        let mut round = 0;
        while set.len() < limit && stale_rounds < self.stability_threshold && round < self.max_rounds
        {
            round += 1;
            let added = self.scroll_round(page, &mut set).await;

            if added == 0 {
                stale_rounds += 1;
                tracing::debug!(
                    round,
                    stale_rounds,
                    threshold = self.stability_threshold,
                    "No new posts found"
                );
            } else {
                stale_rounds = 0;
                tracing::debug!(round, total = set.len(), "Found more posts");
            }

            if !self.settle_delay.is_zero() {
                tokio::time::sleep(self.settle_delay).await;
            }
        }

        Ok(set.into_truncated(limit))
    }

    async fn scroll_round(&self, page: &dyn ProfilePage, set: &mut PostSet) -> usize {
        if let Err(e) = page.scroll_to_bottom().await {
            tracing::debug!("Scroll failed: {}", e);
        }
        self.pacer.pause().await;

        match page.click_if_present(LOAD_MORE_SELECTOR).await {
            Ok(true) => {
                self.pacer.pause().await;
            }
            Ok(false) => {}
            Err(e) => tracing::debug!("Load more click failed: {}", e),
        }

        match page.content().await {
            Ok(html) => {
                let from_hydration =
                    set.merge(extract_posts_from_hydration(&hydration::parse_document(&html)));
                let from_dom = set.merge(extract_dom_posts(&html, &self.base_url));
                from_hydration + from_dom
            }
            Err(e) => {
                tracing::warn!("Reading page content failed: {}", e);
                0
            }
        }
    }
}
