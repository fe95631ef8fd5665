//! Post mining from hydration data.
//!
//! Posts show up in two shapes: wrapped in a feed connection
//! (`data.data.edges[].node.thread_items[0].post`) or as a bare node that
//! carries a caption and a creation time. Both go through [`normalize_post`].

use crate::hydration::{self, as_count, as_id, clean_text, is_truthy};
use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::OnceLock;
use threadscope_core::{Media, MediaType, Post};

type Object = Map<String, Value>;

/// Origin used when synthesizing permalinks.
pub const PERMALINK_ORIGIN: &str = "https://www.threads.net";

fn post_code_regex() -> &'static Regex {
    static POST_CODE: OnceLock<Regex> = OnceLock::new();
    POST_CODE.get_or_init(|| Regex::new(r"/post/([A-Za-z0-9_-]+)").expect("valid regex"))
}

/// The `<code>` in a `/post/<code>` path, if present.
pub fn extract_post_code(text: &str) -> Option<String> {
    post_code_regex()
        .captures(text)
        .map(|caps| caps[1].to_string())
}

/// Epoch seconds to RFC 3339 in UTC with millisecond precision.
///
/// Zero and out-of-range values yield `None`.
pub fn format_timestamp(epoch_secs: i64) -> Option<String> {
    if epoch_secs == 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(epoch_secs, 0).map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_field(node: &Object, key: &str) -> Option<i64> {
    match node.get(key)? {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn first_media(candidate: Option<&Value>, media_type: MediaType) -> Option<Media> {
    let candidate = candidate?.as_object()?;
    let url = candidate.get("url")?.as_str()?;
    if url.is_empty() {
        return None;
    }
    let dimension = |key: &str| {
        as_count(candidate.get(key))
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(0)
    };
    Some(Media {
        media_type,
        url: url.to_string(),
        width: dimension("width"),
        height: dimension("height"),
    })
}

fn first_image_candidate(node: &Value) -> Option<&Value> {
    node.get("image_versions2")?
        .get("candidates")?
        .as_array()?
        .first()
}

fn collect_media(node: &Object) -> Vec<Media> {
    let mut media = Vec::new();

    let root = node
        .get("image_versions2")
        .and_then(|iv| iv.get("candidates"))
        .and_then(Value::as_array)
        .and_then(|c| c.first());
    media.extend(first_media(root, MediaType::Image));

    let video = node
        .get("video_versions")
        .and_then(Value::as_array)
        .and_then(|v| v.first());
    media.extend(first_media(video, MediaType::Video));

    if let Some(carousel) = node.get("carousel_media").and_then(Value::as_array) {
        media.extend(
            carousel
                .iter()
                .filter_map(|item| first_media(first_image_candidate(item), MediaType::Image)),
        );
    }

    media
}

/// Map a post-shaped node onto [`Post`]. `None` when it has no identity.
pub fn normalize_post(node: &Object) -> Option<Post> {
    let id = as_id(node.get("id"))
        .or_else(|| as_id(node.get("pk")))
        .or_else(|| as_id(node.get("code")))?;

    let code = node
        .get("code")
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| extract_post_code(&id));

    let text = node
        .get("caption")
        .and_then(|c| c.get("text"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .or_else(|| node.get("text").and_then(Value::as_str));

    let timestamp = ["taken_at", "created_at", "device_timestamp"]
        .iter()
        .find_map(|key| epoch_field(node, key).filter(|secs| *secs != 0))
        .and_then(format_timestamp);

    let app_info = node.get("text_post_app_info").and_then(Value::as_object);
    let app_count = |key: &str| app_info.and_then(|info| as_count(info.get(key)));
    let reply_to_author = app_info.and_then(|info| info.get("reply_to_author"));

    let username = node
        .get("user")
        .and_then(|u| u.get("username"))
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty());
    let url = match (username, &code) {
        (Some(user), Some(code)) => Some(format!("{PERMALINK_ORIGIN}/@{user}/post/{code}")),
        _ => None,
    };

    Some(Post {
        id,
        code,
        text: clean_text(text),
        timestamp,
        like_count: as_count(node.get("like_count")).or_else(|| app_count("direct_reply_count")),
        reply_count: app_count("reply_count"),
        repost_count: app_count("repost_count").or_else(|| as_count(node.get("reshare_count"))),
        quote_count: app_count("quote_count"),
        media: collect_media(node),
        is_reply: app_info.is_some_and(|info| info.contains_key("reply_to_author")),
        reply_to: reply_to_author
            .and_then(|author| author.get("username"))
            .and_then(Value::as_str)
            .map(str::to_string),
        has_audio: is_truthy(node.get("has_audio")),
        url,
    })
}

/// Post nodes wrapped in a feed connection under `node`.
fn connection_posts(node: &Object) -> impl Iterator<Item = &Object> {
    node.get("data")
        .and_then(|d| d.get("data"))
        .and_then(|d| d.get("edges"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|edge| {
            edge.get("node")?
                .get("thread_items")?
                .as_array()?
                .first()?
                .get("post")?
                .as_object()
        })
}

/// Whether `node` looks like a bare post.
fn is_bare_post(node: &Object) -> bool {
    let has_body = node.contains_key("caption") || node.contains_key("text");
    let has_time = node.contains_key("taken_at") || node.contains_key("created_at");
    let has_identity = ["id", "pk", "code"].iter().any(|k| node.contains_key(*k));
    has_body && has_time && has_identity
}

/// Every distinct post across all blobs, in discovery order.
pub fn extract_posts_from_hydration(blobs: &[Value]) -> Vec<Post> {
    let mut seen = HashSet::new();
    let mut posts = Vec::new();

    for node in hydration::objects(blobs) {
        let bare = is_bare_post(node).then_some(node);
        for candidate in connection_posts(node).chain(bare) {
            if let Some(post) = normalize_post(candidate) {
                if seen.insert(post.id.clone()) {
                    posts.push(post);
                }
            }
        }
    }

    posts
}
