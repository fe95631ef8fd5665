//! Configuration management for Threadscope.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::validate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration.
///
/// This is loaded from `~/.config/threadscope/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Browser launch and fingerprint settings
    pub browser: BrowserConfig,
    /// Scraping loop behavior
    pub scraping: ScrapingConfig,
    /// Result cache settings
    pub cache: CacheConfig,
    /// Per-client request budget
    pub rate_limit: RateLimitConfig,
    /// Concurrent session limits and circuit breaker
    pub concurrency: ConcurrencyConfig,
    /// Target site and allow-list
    pub site: SiteConfig,
    /// HTTP service settings
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            Self::from_toml(&contents)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `THREADSCOPE_HEADLESS`: Override browser headless mode (true/false)
    /// - `THREADSCOPE_CACHE_ENABLED`: Override cache enabled status (true/false)
    /// - `THREADSCOPE_MAX_CONCURRENT`: Override the concurrent session limit
    /// - `THREADSCOPE_BIND_ADDR`: Override the HTTP listen address
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup. Unparseable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("THREADSCOPE_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Some(val) = lookup("THREADSCOPE_CACHE_ENABLED") {
            if let Ok(enabled) = val.parse() {
                self.cache.enabled = enabled;
                tracing::debug!("Override cache.enabled from env: {}", enabled);
            }
        }

        if let Some(val) = lookup("THREADSCOPE_MAX_CONCURRENT") {
            if let Ok(max) = val.parse() {
                self.concurrency.max_concurrent = max;
                tracing::debug!("Override concurrency.max_concurrent from env: {}", max);
            }
        }

        if let Some(val) = lookup("THREADSCOPE_BIND_ADDR") {
            tracing::debug!("Override server.bind_addr from env: {}", val);
            self.server.bind_addr = val;
        }
    }

    /// Reject values the runtime cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the first offending field.
    pub fn validate(&self) -> ConfigResult<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.concurrency.max_concurrent == 0 {
            return Err(invalid("concurrency.max_concurrent", "must be at least 1"));
        }
        if self.rate_limit.points == 0 {
            return Err(invalid("rate_limit.points", "must be at least 1"));
        }
        if self.scraping.min_delay_ms > self.scraping.max_delay_ms {
            return Err(invalid(
                "scraping.min_delay_ms",
                "must not exceed scraping.max_delay_ms",
            ));
        }
        if self.scraping.max_retries == 0 {
            return Err(invalid("scraping.max_retries", "must be at least 1"));
        }
        if self.site.allowed_domains.is_empty() {
            return Err(invalid("site.allowed_domains", "must not be empty"));
        }
        validate::validate_final_url(&self.site.base_url, &self.site.allowed_domains)
            .map_err(|e| invalid("site.base_url", &e.to_string()))?;
        if self.browser.user_agents.is_empty() {
            return Err(invalid("browser.user_agents", "must not be empty"));
        }
        if self.browser.viewports.is_empty() {
            return Err(invalid("browser.viewports", "must not be empty"));
        }
        Ok(())
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/threadscope/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("net", "threadscope", "threadscope")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// A browser window size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run the browser without a window
    pub headless: bool,
    /// Explicit Chrome/Chromium binary; auto-detected when unset
    pub executable_path: Option<PathBuf>,
    /// User-agent pool, one picked per page
    pub user_agents: Vec<String>,
    /// Viewport pool, one picked per page
    pub viewports: Vec<ViewportSize>,
    /// Locale pool, one picked per page
    pub locales: Vec<String>,
    /// Timezone advertised to the page
    pub timezone: String,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl BrowserConfig {
    /// Navigation timeout as a `Duration`.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            executable_path: None,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15".to_string(),
            ],
            viewports: vec![
                ViewportSize { width: 1280, height: 800 },
                ViewportSize { width: 1366, height: 768 },
                ViewportSize { width: 1440, height: 900 },
                ViewportSize { width: 1920, height: 1080 },
            ],
            locales: vec![
                "en-US".to_string(),
                "en-GB".to_string(),
                "en-CA".to_string(),
                "en-AU".to_string(),
            ],
            timezone: "America/New_York".to_string(),
            navigation_timeout_secs: 45,
        }
    }
}

/// Scraping loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Attempts per scrape, including the first
    pub max_retries: u32,
    /// Base backoff between attempts in milliseconds
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    pub retry_max_delay_ms: u64,
    /// Lower bound of the politeness delay in milliseconds
    pub min_delay_ms: u64,
    /// Upper bound of the politeness delay in milliseconds
    pub max_delay_ms: u64,
    /// Extra random spread applied to each delay, in percent
    pub jitter_percent: u32,
    /// Settle time between scroll rounds in milliseconds
    pub scroll_settle_ms: u64,
    /// How long to wait for the post container to render, in milliseconds
    pub wait_for_selector_ms: u64,
    /// Rounds without a new post before the collector gives up
    pub stability_threshold: u32,
    /// Hard ceiling on scroll rounds per collection
    pub max_scroll_rounds: u32,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 10_000,
            min_delay_ms: 1000,
            max_delay_ms: 3000,
            jitter_percent: 20,
            scroll_settle_ms: 3000,
            wait_for_selector_ms: 15_000,
            stability_threshold: 3,
            max_scroll_rounds: 50,
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the result cache
    pub enabled: bool,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
    /// Interval between sweeps of expired entries, in seconds
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    /// Entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 300,
            sweep_interval_secs: 120,
        }
    }
}

/// Per-client request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub points: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Base block once the budget is exhausted, in seconds
    pub block_secs: u64,
    /// Extra block added per recorded violation, in seconds
    pub violation_step_secs: u64,
    /// Ceiling on the extra block, in seconds
    pub max_extra_block_secs: u64,
    /// Idle time after which a violation record is forgotten, in seconds
    pub violation_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            points: 5,
            window_secs: 60,
            block_secs: 15 * 60,
            violation_step_secs: 5 * 60,
            max_extra_block_secs: 60 * 60,
            violation_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Concurrent session limits and circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum simultaneous scrapes
    pub max_concurrent: usize,
    /// Deadline per scrape in seconds
    pub timeout_secs: u64,
    /// Resident memory ceiling for the admission gate, in megabytes
    pub memory_limit_mb: u64,
    /// Growth during a single scrape that gets logged, in megabytes
    pub memory_warn_mb: u64,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            timeout_secs: 30,
            memory_limit_mb: 1024,
            memory_warn_mb: 500,
        }
    }
}

/// Target site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Origin profiles are loaded from
    pub base_url: String,
    /// Hosts a profile URL may name
    pub allowed_domains: Vec<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.threads.net".to_string(),
            allowed_domains: validate::DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

/// HTTP service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,
    /// Maximum request body size in bytes
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".to_string(),
            body_limit_bytes: 16 * 1024,
        }
    }
}
