//! Threadscope Core - Foundation crate for the Threadscope scraper.
//!
//! This crate provides shared record types, input validation, error handling
//! and configuration management that all other Threadscope crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error taxonomy using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Scraped records (`Profile`, `Post`, `Media`) and the validated `Handle`
//! - [`validate`] - Handle/URL validation and SSRF checks
//!
//! # Example
//!
//! ```rust
//! use threadscope_core::{validate, AppConfig, Handle};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//!
//! let handle = Handle::parse("https://www.threads.net/@zuck")?;
//! assert_eq!(handle.profile_url(&config.site.base_url), "https://www.threads.net/@zuck");
//!
//! assert!(Handle::parse("http://127.0.0.1/@x").is_err());
//! assert_eq!(validate::validate_limit(None)?, 30);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
#[allow(missing_docs)]
pub mod types;
pub mod validate;

// Re-export commonly used types
pub use config::{
    AppConfig, BrowserConfig, CacheConfig, ConcurrencyConfig, RateLimitConfig, ScrapingConfig,
    ServerConfig, SiteConfig, ViewportSize,
};
pub use error::{ConfigError, ConfigResult, ErrorCategory, Result, ScrapeError};
pub use types::{Handle, Media, MediaType, Post, Profile, ProfileWithPosts};
