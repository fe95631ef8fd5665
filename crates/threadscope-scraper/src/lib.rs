//! Threadscope Scraper - profile and post extraction.
//!
//! This crate turns an open profile page into structured data. It mines the
//! JSON hydration blobs embedded in server-rendered markup, falls back to
//! DOM patterns for posts loaded by scrolling, and wraps everything in a
//! cached, retrying facade.
//!
//! # Features
//!
//! - Schema-agnostic hydration mining with bounded traversal
//! - Scroll-and-rescan post collection with a stability cutoff
//! - TTL cache with a background sweep
//! - Exponential-backoff retries that never repeat permanent failures
//!
//! # Example
//!
//! ```rust,ignore
//! use threadscope_core::{AppConfig, Handle};
//! use threadscope_scraper::{ScrapeOptions, ThreadsScraper};
//!
//! let scraper = ThreadsScraper::new(&AppConfig::default());
//! scraper.init().await?;
//!
//! let handle = Handle::parse("@zuck")?;
//! let posts = scraper.get_posts(&handle, ScrapeOptions::with_limit(10)).await?;
//!
//! scraper.close().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[allow(missing_docs)]
pub mod cache;
#[allow(missing_docs)]
pub mod collector;
pub mod dom;
#[allow(missing_docs)]
pub mod facade;
pub mod hydration;
#[allow(missing_docs)]
pub mod pacing;
pub mod posts;
pub mod profile;
#[allow(missing_docs)]
pub mod retry;
pub mod sink;

// Re-export commonly used types
pub use cache::{CacheStats, CachedValue, TtlCache};
pub use collector::{PostCollector, PostSet};
pub use dom::extract_dom_posts;
pub use hydration::{walk, JsonWalker};
pub use pacing::Pacer;
pub use posts::{extract_posts_from_hydration, normalize_post};
pub use profile::{extract_profile, normalize_user, pick_user};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use facade::{ScrapeOptions, ThreadsScraper};
pub use sink::{NoopSink, SnapshotSink};
