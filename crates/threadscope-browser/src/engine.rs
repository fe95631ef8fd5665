use crate::actions::{PageProvider, ProfilePage};
use crate::error::{BrowserError, Result};
use crate::fingerprint::{SessionProfile, STEALTH_ARGS};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use futures_util::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use threadscope_core::BrowserConfig;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

struct Session {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Browser automation engine
///
/// One browser process is shared by every scrape; each scrape gets its own
/// page in an incognito context, presenting a freshly drawn fingerprint.
pub struct BrowserEngine {
    config: BrowserConfig,
    pinned: Option<SessionProfile>,
    session: Mutex<Option<Session>>,
}

impl BrowserEngine {
    /// Create an engine that draws a new session profile for every page.
    /// Nothing is launched yet.
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            pinned: None,
            session: Mutex::new(None),
        }
    }

    /// Create an engine that presents the same session profile on every page
    pub fn with_profile(config: BrowserConfig, profile: SessionProfile) -> Self {
        Self {
            config,
            pinned: Some(profile),
            session: Mutex::new(None),
        }
    }

    /// Profile for the next page: the pinned one, or a new random draw.
    pub fn session_profile(&self) -> SessionProfile {
        self.pinned
            .clone()
            .unwrap_or_else(|| SessionProfile::randomized(&self.config))
    }

    fn launch_config(&self, profile: &SessionProfile) -> Result<ChromeConfig> {
        let width = profile.viewport.width;
        let height = profile.viewport.height;
        let mut builder = ChromeConfig::builder()
            .incognito()
            .no_sandbox()
            .viewport(Viewport {
                width,
                height,
                device_scale_factor: Some(1.0),
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .window_size(width, height)
            .request_timeout(self.config.navigation_timeout())
            .args(STEALTH_ARGS.iter().copied())
            .arg(format!("--lang={}", profile.locale));

        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.config.executable_path {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(BrowserError::LaunchError)
    }

    async fn ensure_launched(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            return Ok(());
        }

        let profile = self.session_profile();
        let config = self.launch_config(&profile)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::LaunchError(e.to_string()))?;

        // Spawn browser handler
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler error: {}", e);
                }
            }
        });

        tracing::info!(
            headless = self.config.headless,
            viewport = ?profile.viewport,
            "Browser launched"
        );
        *session = Some(Session { browser, handler });
        Ok(())
    }

    async fn prepare_page(&self, page: &Page, profile: &SessionProfile) -> Result<()> {
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(profile.user_agent.clone())
            .accept_language(profile.accept_language())
            .build()
            .map_err(BrowserError::ChromiumError)?;
        page.execute(user_agent).await.map_err(chromium)?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(profile.viewport.width),
            i64::from(profile.viewport.height),
            1.0,
            false,
        ))
        .await
        .map_err(chromium)?;

        page.execute(SetTimezoneOverrideParams::new(profile.timezone.clone()))
            .await
            .map_err(chromium)?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            profile.stealth_script(),
        ))
        .await
        .map_err(chromium)?;

        Ok(())
    }
}

fn chromium(err: chromiumoxide::error::CdpError) -> BrowserError {
    BrowserError::ChromiumError(err.to_string())
}

#[async_trait]
impl PageProvider for BrowserEngine {
    async fn init(&self) -> Result<()> {
        self.ensure_launched().await
    }

    async fn open_page(&self, url: &Url) -> Result<Arc<dyn ProfilePage>> {
        self.ensure_launched().await?;

        let page = {
            let session = self.session.lock().await;
            let session = session.as_ref().ok_or(BrowserError::NotInitialized)?;
            session
                .browser
                .new_page("about:blank")
                .await
                .map_err(chromium)?
        };

        let page = ChromiumPage { page };
        let profile = self.session_profile();
        tracing::debug!(
            locale = %profile.locale,
            viewport = ?profile.viewport,
            "Page fingerprint drawn"
        );
        if let Err(e) = self.prepare_page(&page.page, &profile).await {
            page.close_quietly().await;
            return Err(e);
        }

        let timeout = self.config.navigation_timeout();
        match tokio::time::timeout(timeout, page.page.goto(url.as_str())).await {
            Ok(Ok(_)) => {
                let page: Arc<dyn ProfilePage> = Arc::new(page);
                Ok(page)
            }
            Ok(Err(e)) => {
                page.close_quietly().await;
                Err(BrowserError::NavigationError(e.to_string()))
            }
            Err(_) => {
                page.close_quietly().await;
                Err(BrowserError::Timeout(format!(
                    "navigation to {url} exceeded {}s",
                    timeout.as_secs()
                )))
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let Some(mut session) = self.session.lock().await.take() else {
            return Ok(());
        };

        let result = session.browser.close().await.map(|_| ()).map_err(chromium);
        if let Err(e) = session.browser.wait().await {
            tracing::debug!("Browser wait failed: {}", e);
        }
        session.handler.abort();
        tracing::info!("Browser closed");
        result
    }
}

/// [`ProfilePage`] backed by a chromiumoxide page.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn close_quietly(&self) {
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Page close failed: {}", e);
        }
    }
}

#[async_trait]
impl ProfilePage for ChromiumPage {
    async fn title(&self) -> Result<Option<String>> {
        self.page.get_title().await.map_err(chromium)
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.map_err(chromium)
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map(|_| ())
            .map_err(|e| BrowserError::ScriptError(e.to_string()))
    }

    async fn click_if_present(&self, selector: &str) -> Result<bool> {
        let Ok(element) = self.page.find_element(selector).await else {
            return Ok(false);
        };
        element
            .click()
            .await
            .map(|_| true)
            .map_err(|e| BrowserError::SelectorNotFound(format!("{selector}: {e}")))
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await.map_err(chromium)
    }
}
