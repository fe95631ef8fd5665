//! DOM fallback for posts that never made it into hydration data.
//!
//! Posts loaded by scrolling are rendered client-side, so their data only
//! exists as markup. The fields recoverable from markup are limited to the
//! permalink, the first text run and the creation time.

use crate::hydration::clean_text;
use crate::posts::extract_post_code;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::OnceLock;
use threadscope_core::Post;
use url::Url;

/// Selector for one rendered post.
pub const POST_CONTAINER_SELECTOR: &str = r#"[data-pressable-container="true"]"#;
/// Selector for the permalink inside a post.
pub const PERMALINK_SELECTOR: &str = r#"a[href*="/post/"]"#;
/// Selector for the post text.
pub const TEXT_SELECTOR: &str = r#"[dir="auto"] span"#;
/// Selector for the creation time.
pub const TIME_SELECTOR: &str = "time[datetime]";

struct Selectors {
    container: Selector,
    permalink: Selector,
    text: Selector,
    time: Selector,
}

fn selectors() -> &'static Selectors {
    static SELECTORS: OnceLock<Selectors> = OnceLock::new();
    SELECTORS.get_or_init(|| Selectors {
        container: Selector::parse(POST_CONTAINER_SELECTOR).expect("valid selector"),
        permalink: Selector::parse(PERMALINK_SELECTOR).expect("valid selector"),
        text: Selector::parse(TEXT_SELECTOR).expect("valid selector"),
        time: Selector::parse(TIME_SELECTOR).expect("valid selector"),
    })
}

fn absolute_url(href: &str, base: Option<&Url>) -> Option<String> {
    match Url::parse(href) {
        Ok(url) => Some(url.into()),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            base.and_then(|base| base.join(href).ok()).map(Into::into)
        }
        Err(_) => None,
    }
}

fn post_from_container(container: ElementRef<'_>, base: Option<&Url>) -> Option<Post> {
    let sel = selectors();
    let href = container
        .select(&sel.permalink)
        .next()?
        .value()
        .attr("href")?;
    let code = extract_post_code(href)?;

    let mut post = Post::from_permalink(code, absolute_url(href, base));
    post.text = container
        .select(&sel.text)
        .next()
        .and_then(|span| clean_text(Some(&span.text().collect::<String>())));
    post.timestamp = container
        .select(&sel.time)
        .next()
        .and_then(|time| time.value().attr("datetime"))
        .filter(|dt| !dt.is_empty())
        .map(str::to_string);
    Some(post)
}

/// Posts rendered in `html`, deduplicated by permalink code.
///
/// Relative permalinks are resolved against `base_url`.
pub fn extract_dom_posts(html: &str, base_url: &str) -> Vec<Post> {
    let base = Url::parse(base_url).ok();
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();

    document
        .select(&selectors().container)
        .filter_map(|container| post_from_container(container, base.as_ref()))
        .filter(|post| seen.insert(post.id.clone()))
        .collect()
}
