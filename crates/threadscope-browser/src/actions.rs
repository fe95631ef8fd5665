use crate::error::Result;
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use threadscope_core::{validate, Handle, ScrapeError, SiteConfig};
use url::Url;

/// Title fragments the site uses for missing or removed profiles.
const NOT_FOUND_TITLES: &[&str] = &["Page not found", "Sorry"];

/// An open page, as seen by the scraping code.
#[async_trait]
pub trait ProfilePage: Send + Sync {
    /// Document title, if any
    async fn title(&self) -> Result<Option<String>>;

    /// Serialized DOM of the page
    async fn content(&self) -> Result<String>;

    /// Wait until `selector` is attached; `false` on timeout
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool>;

    /// Scroll the window to the bottom of the document
    async fn scroll_to_bottom(&self) -> Result<()>;

    /// Click the first element matching `selector`; `false` if none
    async fn click_if_present(&self, selector: &str) -> Result<bool>;

    /// Close the page
    async fn close(&self) -> Result<()>;
}

/// Source of fresh pages on a shared browser.
#[async_trait]
pub trait PageProvider: Send + Sync {
    /// Launch the browser if it is not running yet
    async fn init(&self) -> Result<()>;

    /// Open a new page and navigate it to `url`
    async fn open_page(&self, url: &Url) -> Result<Arc<dyn ProfilePage>>;

    /// Tear down the browser
    async fn close(&self) -> Result<()>;
}

/// Owns a page for the duration of one scrape.
///
/// Call [`PageGuard::close`] on normal paths. If the guard is dropped while
/// still open (error, cancellation) the close is scheduled on the current
/// Tokio runtime.
pub struct PageGuard {
    page: Arc<dyn ProfilePage>,
    closed: bool,
}

impl PageGuard {
    pub fn new(page: Arc<dyn ProfilePage>) -> Self {
        Self {
            page,
            closed: false,
        }
    }

    /// Close the page now, consuming the guard.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.page.close().await
    }
}

impl Deref for PageGuard {
    type Target = dyn ProfilePage;

    fn deref(&self) -> &Self::Target {
        self.page.as_ref()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = Arc::clone(&self.page);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        tracing::warn!("Background page close failed: {}", e);
                    }
                });
            }
            Err(_) => tracing::warn!("No runtime available to close dropped page"),
        }
    }
}

/// Whether a page title marks a missing or removed profile.
pub fn is_not_found_title(title: &str) -> bool {
    NOT_FOUND_TITLES.iter().any(|marker| title.contains(marker))
}

/// Open the canonical profile page for `handle`.
///
/// The final URL is re-validated before navigation. A not-found title
/// closes the page and fails with [`ScrapeError::NotFound`].
pub async fn navigate_to_profile(
    provider: &dyn PageProvider,
    handle: &Handle,
    site: &SiteConfig,
) -> threadscope_core::Result<PageGuard> {
    let url = validate::validate_final_url(
        &handle.profile_url(&site.base_url),
        &site.allowed_domains,
    )?;

    tracing::debug!(handle = %handle, %url, "Navigating to profile");
    let page = PageGuard::new(provider.open_page(&url).await?);

    let title = page.title().await?.unwrap_or_default();
    if is_not_found_title(&title) {
        if let Err(e) = page.close().await {
            tracing::warn!("Failed to close not-found page: {}", e);
        }
        return Err(ScrapeError::NotFound(format!("profile @{handle} not found")));
    }

    Ok(page)
}
