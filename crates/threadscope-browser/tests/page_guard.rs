//! Page lifecycle tests against an in-memory page provider.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threadscope_browser::{
    navigate_to_profile, BrowserError, PageGuard, PageProvider, ProfilePage, Result,
};
use threadscope_core::{Handle, ScrapeError, SiteConfig};
use url::Url;

struct FakePage {
    title: String,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ProfilePage for FakePage {
    async fn title(&self) -> Result<Option<String>> {
        Ok(Some(self.title.clone()))
    }

    async fn content(&self) -> Result<String> {
        Ok("<html></html>".to_string())
    }

    async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        Ok(())
    }

    async fn click_if_present(&self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeProvider {
    title: String,
    closes: Arc<AtomicUsize>,
    opened: Mutex<Vec<String>>,
}

impl FakeProvider {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            closes: Arc::new(AtomicUsize::new(0)),
            opened: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PageProvider for FakeProvider {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn open_page(&self, url: &Url) -> Result<Arc<dyn ProfilePage>> {
        self.opened.lock().expect("lock").push(url.to_string());
        Ok(Arc::new(FakePage {
            title: self.title.clone(),
            closes: Arc::clone(&self.closes),
        }))
    }

    async fn close(&self) -> Result<()> {
        Err(BrowserError::NotInitialized)
    }
}

#[tokio::test]
async fn navigates_to_canonical_url() {
    let provider = FakeProvider::new("Alice (@alice) • Threads");
    let handle = Handle::parse("https://threads.net/@alice/post/xyz").expect("valid");

    let page = navigate_to_profile(&provider, &handle, &SiteConfig::default())
        .await
        .expect("profile opens");
    assert_eq!(
        provider.opened.lock().expect("lock").as_slice(),
        ["https://www.threads.net/@alice"]
    );

    page.close().await.expect("close");
    assert_eq!(provider.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn not_found_title_closes_page() {
    let provider = FakeProvider::new("Page not found • Threads");
    let handle = Handle::parse("ghost").expect("valid");

    let err = navigate_to_profile(&provider, &handle, &SiteConfig::default())
        .await
        .err()
        .expect("not found");
    assert!(matches!(err, ScrapeError::NotFound(_)));
    assert!(!err.is_retryable());
    assert_eq!(provider.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn misconfigured_base_url_never_navigates() {
    let provider = FakeProvider::new("ok");
    let handle = Handle::parse("alice").expect("valid");
    let site = SiteConfig {
        base_url: "http://169.254.169.254".to_string(),
        ..SiteConfig::default()
    };

    let err = navigate_to_profile(&provider, &handle, &site)
        .await
        .err()
        .expect("rejected");
    assert!(matches!(err, ScrapeError::Validation(_)));
    assert!(provider.opened.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn dropped_guard_closes_in_background() {
    let closes = Arc::new(AtomicUsize::new(0));
    let page = FakePage {
        title: String::new(),
        closes: Arc::clone(&closes),
    };

    {
        let guard = PageGuard::new(Arc::new(page));
        assert!(guard.wait_for_selector("body", Duration::from_secs(1)).await.expect("wait"));
    }

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn explicit_close_is_not_repeated_on_drop() {
    let closes = Arc::new(AtomicUsize::new(0));
    let guard = PageGuard::new(Arc::new(FakePage {
        title: String::new(),
        closes: Arc::clone(&closes),
    }));

    guard.close().await.expect("close");
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}
