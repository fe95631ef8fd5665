//! Browser session management for profile scraping.
//!
//! Provides a lazily launched headless browser with fingerprint masking,
//! a driver-independent page abstraction, and a scoped page guard that
//! closes pages on every exit path.

pub mod actions;
pub mod engine;
pub mod error;
pub mod fingerprint;

pub use actions::{is_not_found_title, navigate_to_profile, PageGuard, PageProvider, ProfilePage};
pub use engine::BrowserEngine;
pub use error::{BrowserError, Result};
pub use fingerprint::SessionProfile;
