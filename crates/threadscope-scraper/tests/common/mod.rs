//! In-memory pages for exercising the scraper without a browser.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadscope_browser::{BrowserError, PageProvider, ProfilePage, Result};
use url::Url;

/// Wrap a JSON value in a hydration script tag.
pub fn hydration_script(value: &Value) -> String {
    format!(r#"<script type="application/json" data-sjs>{value}</script>"#)
}

/// A bare post node as it appears in hydration data.
pub fn post_node(id: &str) -> Value {
    json!({
        "id": id,
        "code": id,
        "caption": {"text": format!("post {id}")},
        "taken_at": 1_700_000_000,
        "user": {"username": "alice"}
    })
}

/// A page whose hydration data holds the given post ids.
pub fn hydration_page(ids: &[&str]) -> String {
    let posts: Vec<Value> = ids.iter().map(|id| post_node(id)).collect();
    hydration_script(&json!({ "items": posts }))
}

/// A rendered post container linking to `/post/<code>`.
pub fn dom_post(code: &str) -> String {
    format!(
        r#"<div data-pressable-container="true"><a href="/@alice/post/{code}">open</a><div dir="auto"><span>dom {code}</span></div></div>"#
    )
}

/// A hydration blob carrying a full user node.
pub fn profile_blob() -> String {
    hydration_script(&json!({
        "user": {
            "username": "alice",
            "full_name": "Alice",
            "biography": "hello",
            "follower_count": 10,
            "following_count": 2,
            "thread_count": 3,
            "is_verified": false
        }
    }))
}

/// Shared counters across every page a provider hands out.
#[derive(Default)]
pub struct PageStats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub scrolls: AtomicUsize,
}

impl PageStats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Returns the scripted documents in order, repeating the last one.
pub struct ScriptedPage {
    title: String,
    documents: Mutex<VecDeque<String>>,
    stats: Arc<PageStats>,
}

impl ScriptedPage {
    pub fn new(title: &str, documents: Vec<String>, stats: Arc<PageStats>) -> Self {
        Self {
            title: title.to_string(),
            documents: Mutex::new(documents.into()),
            stats,
        }
    }
}

#[async_trait]
impl ProfilePage for ScriptedPage {
    async fn title(&self) -> Result<Option<String>> {
        Ok(Some(self.title.clone()))
    }

    async fn content(&self) -> Result<String> {
        let mut documents = self.documents.lock().expect("lock");
        if documents.len() > 1 {
            Ok(documents.pop_front().unwrap_or_default())
        } else {
            Ok(documents.front().cloned().unwrap_or_default())
        }
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.stats.scrolls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn click_if_present(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn close(&self) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out a fresh [`ScriptedPage`] per navigation.
///
/// Queued failures are returned by `open_page` before any page is opened.
pub struct ScriptedProvider {
    title: String,
    documents: Vec<String>,
    failures: Mutex<VecDeque<BrowserError>>,
    pub stats: Arc<PageStats>,
}

impl ScriptedProvider {
    pub fn new(title: &str, documents: Vec<String>) -> Self {
        Self {
            title: title.to_string(),
            documents,
            failures: Mutex::new(VecDeque::new()),
            stats: Arc::new(PageStats::default()),
        }
    }

    pub fn profile(documents: Vec<String>) -> Self {
        Self::new("Alice (@alice) • Threads", documents)
    }

    #[must_use]
    pub fn failing_first(self, err: BrowserError) -> Self {
        self.failures.lock().expect("lock").push_back(err);
        self
    }

    pub fn page(&self) -> ScriptedPage {
        ScriptedPage::new(&self.title, self.documents.clone(), Arc::clone(&self.stats))
    }
}

#[async_trait]
impl PageProvider for ScriptedProvider {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn open_page(&self, _url: &Url) -> Result<Arc<dyn ProfilePage>> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failures.lock().expect("lock").pop_front() {
            return Err(err);
        }
        Ok(Arc::new(self.page()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
