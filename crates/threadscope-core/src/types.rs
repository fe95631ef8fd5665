//! Shared types used across Threadscope.
//!
//! Scraped records are plain serde structs: every field the origin may omit
//! is an `Option`, so a partially hydrated page still yields a record.

use crate::error::ScrapeError;
use crate::validate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A validated, normalized profile handle (without the leading `@`).
///
/// The only way to obtain a `Handle` is through validation, so holding one
/// proves the value is safe to splice into a navigation URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Handle(String);

impl Handle {
    /// Validate a raw handle or profile URL against the default allow-list.
    ///
    /// # Errors
    /// Returns [`ScrapeError::Validation`] when the input is not an acceptable
    /// handle or profile URL.
    pub fn parse(raw: &str) -> Result<Self, ScrapeError> {
        validate::validate_and_normalize_handle(raw, validate::DEFAULT_ALLOWED_DOMAINS)
    }

    /// Wrap an already-normalized handle. Only the validator calls this.
    pub(crate) fn from_normalized(handle: String) -> Self {
        Self(handle)
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical profile URL on the given origin, e.g. `https://www.threads.net/@name`.
    #[must_use]
    pub fn profile_url(&self, base_url: &str) -> String {
        format!("{}/@{}", base_url.trim_end_matches('/'), self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Profile snapshot taken during a single scrape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub username: String,
    pub full_name: Option<String>,
    pub follower_count: Option<u64>,
    pub following_count: Option<u64>,
    pub post_count: Option<u64>,
    pub is_verified: bool,
    pub biography: Option<String>,
    pub profile_pic_url: Option<String>,
    pub external_url: Option<String>,
}

/// A single post. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub code: Option<String>,
    pub text: Option<String>,
    /// RFC 3339 creation time
    pub timestamp: Option<String>,
    pub like_count: Option<u64>,
    pub reply_count: Option<u64>,
    pub repost_count: Option<u64>,
    pub quote_count: Option<u64>,
    pub media: Vec<Media>,
    pub is_reply: bool,
    pub reply_to: Option<String>,
    pub has_audio: bool,
    pub url: Option<String>,
}

impl Post {
    /// A post known only by its permalink code, as discovered in the DOM.
    #[must_use]
    pub fn from_permalink(code: String, url: Option<String>) -> Self {
        Self {
            id: code.clone(),
            code: Some(code),
            text: None,
            timestamp: None,
            like_count: None,
            reply_count: None,
            repost_count: None,
            quote_count: None,
            media: Vec::new(),
            is_reply: false,
            reply_to: None,
            has_audio: false,
            url,
        }
    }
}

/// Kind of media attached to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

/// One image or video attached to a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

/// Profile and posts scraped from one page load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileWithPosts {
    pub profile: Profile,
    pub posts: Vec<Post>,
}
