//! Profile mining from hydration data.

use crate::hydration::{self, as_count, clean_text, is_truthy};
use serde_json::{Map, Value};
use threadscope_core::{Profile, Result, ScrapeError};

type Object = Map<String, Value>;

/// Page text shown instead of content for private accounts.
const PRIVATE_MARKERS: &[&str] = &["This account is private", "This profile is private"];

/// Fail with [`ScrapeError::Forbidden`] when `html` is a private-account wall.
pub fn ensure_accessible(html: &str) -> Result<()> {
    if PRIVATE_MARKERS.iter().any(|marker| html.contains(marker)) {
        return Err(ScrapeError::Forbidden("profile is private".to_string()));
    }
    Ok(())
}

/// Plausibility score for a user-shaped node, or `None` if it is not one.
///
/// A candidate needs a string `username` plus either a numeric
/// `follower_count` or a `biography` key.
pub fn score_user(node: &Object) -> Option<u32> {
    let has_username = node.get("username").is_some_and(Value::is_string);
    let numeric_followers = node.get("follower_count").is_some_and(Value::is_number);
    if !has_username || !(numeric_followers || node.contains_key("biography")) {
        return None;
    }

    let bonus = [
        is_truthy(node.get("full_name")),
        is_truthy(node.get("biography")),
        numeric_followers,
        is_truthy(node.get("hd_profile_pic_versions")),
        is_truthy(node.get("thread_count")),
        is_truthy(node.get("following_count")),
    ]
    .into_iter()
    .filter(|hit| *hit)
    .count();

    Some(2 + u32::try_from(bonus).unwrap_or(0))
}

/// The richest user-shaped node across all blobs. Ties go to the first seen.
pub fn pick_user(blobs: &[Value]) -> Option<&Object> {
    let mut best: Option<(u32, &Object)> = None;
    for node in hydration::objects(blobs) {
        if let Some(score) = score_user(node) {
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, node));
            }
        }
    }
    best.map(|(_, node)| node)
}

/// Map a user node onto [`Profile`].
pub fn normalize_user(node: &Object) -> Option<Profile> {
    let username = node.get("username")?.as_str()?.to_string();

    let profile_pic_url = node
        .get("hd_profile_pic_versions")
        .and_then(Value::as_array)
        .and_then(|pics| pics.last())
        .and_then(|pic| pic.get("url"))
        .and_then(Value::as_str)
        .or_else(|| node.get("profile_pic_url").and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string);

    let external_url = node
        .get("bio_links")
        .and_then(Value::as_array)
        .and_then(|links| {
            links
                .iter()
                .find_map(|link| link.get("url").and_then(Value::as_str))
        })
        .map(str::to_string);

    Some(Profile {
        username,
        full_name: clean_text(node.get("full_name").and_then(Value::as_str)),
        follower_count: as_count(node.get("follower_count")),
        following_count: as_count(node.get("following_count")),
        post_count: as_count(node.get("thread_count")),
        is_verified: is_truthy(node.get("is_verified")),
        biography: clean_text(node.get("biography").and_then(Value::as_str)),
        profile_pic_url,
        external_url,
    })
}

/// Mine the profile from a page's HTML.
///
/// # Errors
/// Returns [`ScrapeError::Extraction`] when no user-shaped node is present.
pub fn extract_profile(html: &str) -> Result<Profile> {
    let blobs = hydration::parse_document(html);
    if blobs.is_empty() {
        return Err(ScrapeError::Extraction(
            "no hydration data on profile page".to_string(),
        ));
    }

    let user = pick_user(&blobs).ok_or_else(|| {
        ScrapeError::Extraction("could not locate profile data in hydration JSON".to_string())
    })?;

    normalize_user(user)
        .ok_or_else(|| ScrapeError::Extraction("failed to normalize profile data".to_string()))
}
