use thiserror::Error;
use threadscope_core::ScrapeError;

pub type Result<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("chromium error: {0}")]
    ChromiumError(String),

    #[error("browser launch failed: {0}")]
    LaunchError(String),

    #[error("browser not initialized")]
    NotInitialized,

    #[error("navigation failed: {0}")]
    NavigationError(String),

    #[error("selector not found: {0}")]
    SelectorNotFound(String),

    #[error("script evaluation failed: {0}")]
    ScriptError(String),

    #[error("timeout: {0}")]
    Timeout(String),
}

impl From<BrowserError> for ScrapeError {
    fn from(err: BrowserError) -> Self {
        match err {
            BrowserError::NavigationError(msg) => ScrapeError::Network(msg),
            BrowserError::Timeout(msg) => ScrapeError::Timeout(msg),
            BrowserError::SelectorNotFound(sel) => {
                ScrapeError::Extraction(format!("selector not found: {sel}"))
            }
            other => ScrapeError::Browser(other.to_string()),
        }
    }
}
