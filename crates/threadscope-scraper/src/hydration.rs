//! Hydration blob extraction and traversal.
//!
//! Server-rendered profile pages embed their data as JSON inside
//! `<script type="application/json" data-sjs>` tags. The shape of that JSON
//! changes often, so nothing here assumes a schema: blobs are parsed
//! leniently and walked node by node, and the profile and post miners pick
//! out whatever looks right.

use scraper::{Html, Selector};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Selector for embedded hydration scripts.
pub const HYDRATION_SCRIPT_SELECTOR: &str = r#"script[type="application/json"][data-sjs]"#;

/// Deepest nesting level the walker descends into.
pub const MAX_WALK_DEPTH: usize = 128;

/// Most nodes the walker yields from one root.
pub const MAX_WALK_NODES: usize = 250_000;

fn hydration_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse(HYDRATION_SCRIPT_SELECTOR).expect("valid selector"))
}

/// Raw text of every hydration script in `html`, in document order.
pub fn extract_blobs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(hydration_selector())
        .map(|script| script.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .collect()
}

/// Parse blobs as JSON, skipping the malformed ones.
pub fn parse_blobs<S: AsRef<str>>(blobs: &[S]) -> Vec<Value> {
    blobs
        .iter()
        .filter_map(|blob| match serde_json::from_str(blob.as_ref()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("Skipping malformed hydration blob: {}", e);
                None
            }
        })
        .collect()
}

/// Extract and parse every hydration blob in `html`.
pub fn parse_document(html: &str) -> Vec<Value> {
    parse_blobs(&extract_blobs(html))
}

/// Depth-first iterator over every object and array under a JSON root.
///
/// The root itself is yielded first when it is a container. Scalars are
/// skipped. Traversal stops descending at [`MAX_WALK_DEPTH`] and ends
/// after [`MAX_WALK_NODES`] nodes, so hostile input cannot make it run
/// unbounded. Calling [`walk`] again restarts from the root.
pub struct JsonWalker<'a> {
    stack: Vec<(&'a Value, usize)>,
    yielded: usize,
    max_depth: usize,
    max_nodes: usize,
}

impl<'a> JsonWalker<'a> {
    fn new(root: &'a Value, max_depth: usize, max_nodes: usize) -> Self {
        Self {
            stack: vec![(root, 0)],
            yielded: 0,
            max_depth,
            max_nodes,
        }
    }
}

impl<'a> Iterator for JsonWalker<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        if self.yielded >= self.max_nodes {
            return None;
        }

        while let Some((node, depth)) = self.stack.pop() {
            let children: Box<dyn DoubleEndedIterator<Item = &'a Value>> = match node {
                Value::Object(map) => Box::new(map.values()),
                Value::Array(items) => Box::new(items.iter()),
                _ => continue,
            };

            if depth < self.max_depth {
                // reversed so the first child is popped first
                self.stack.extend(
                    children
                        .rev()
                        .filter(|child| child.is_object() || child.is_array())
                        .map(|child| (child, depth + 1)),
                );
            }

            self.yielded += 1;
            return Some(node);
        }

        None
    }
}

/// Walk `root` with the default ceilings.
pub fn walk(root: &Value) -> JsonWalker<'_> {
    JsonWalker::new(root, MAX_WALK_DEPTH, MAX_WALK_NODES)
}

/// Walk `root` with explicit ceilings.
pub fn walk_bounded(root: &Value, max_depth: usize, max_nodes: usize) -> JsonWalker<'_> {
    JsonWalker::new(root, max_depth, max_nodes)
}

/// Every object node across all blobs, in walk order.
pub fn objects<'a>(blobs: &'a [Value]) -> impl Iterator<Item = &'a Map<String, Value>> + 'a {
    blobs
        .iter()
        .flat_map(walk)
        .filter_map(Value::as_object)
}

/// Collapse whitespace, drop zero-width characters and trim.
///
/// Returns `None` for missing or blank input.
pub fn clean_text(text: Option<&str>) -> Option<String> {
    let text = text?;
    let cleaned = text
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

/// Truthiness in the loose sense page scripts use.
pub(crate) fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

/// Non-negative integer field, tolerating float encodings.
pub(crate) fn as_count(value: Option<&Value>) -> Option<u64> {
    let Value::Number(n) = value? else {
        return None;
    };
    n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let v = f as u64;
                v
            })
    })
}

/// String or numeric identifier as a string.
pub(crate) fn as_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_blobs_from_markup() {
        let html = r#"<html><head>
            <script type="application/json" data-sjs>{"a":1}</script>
            <script type="application/json">{"ignored":true}</script>
            <script type="application/json" data-sjs>  </script>
            <script type="application/json" data-sjs>[1,2]</script>
        </head><body></body></html>"#;
        let blobs = extract_blobs(html);
        assert_eq!(blobs, vec![r#"{"a":1}"#.to_string(), "[1,2]".to_string()]);
    }

    #[test]
    fn test_malformed_blobs_skipped() {
        let values = parse_blobs(&["{not json", r#"{"ok":true}"#, ""]);
        assert_eq!(values, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_walk_is_depth_first_and_complete() {
        let root = json!({"a": {"b": [ {"c": 1} ]}, "d": [], "e": 5});
        let nodes: Vec<_> = walk(&root).collect();
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes[0], &root);
        assert_eq!(nodes[1], &json!({"b": [ {"c": 1} ]}));
        assert_eq!(nodes[2], &json!([ {"c": 1} ]));
        assert_eq!(nodes[3], &json!({"c": 1}));
        assert_eq!(nodes[4], &json!([]));
    }

    #[test]
    fn test_walk_restarts() {
        let root = json!([{"x": 1}, {"y": 2}]);
        assert_eq!(walk(&root).count(), 3);
        assert_eq!(walk(&root).count(), 3);
    }

    #[test]
    fn test_walk_scalar_root_yields_nothing() {
        assert_eq!(walk(&json!("text")).count(), 0);
        assert_eq!(walk(&json!(null)).count(), 0);
    }

    #[test]
    fn test_walk_depth_ceiling() {
        let mut deep = json!({"leaf": true});
        for _ in 0..300 {
            deep = json!({ "n": deep });
        }
        assert_eq!(walk(&deep).count(), MAX_WALK_DEPTH + 1);
        assert_eq!(walk_bounded(&deep, 3, 1000).count(), 4);
    }

    #[test]
    fn test_walk_node_ceiling() {
        let wide = Value::Array((0..100).map(|i| json!({ "i": i })).collect());
        assert_eq!(walk_bounded(&wide, 10, 25).count(), 25);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(
            clean_text(Some("  hello \n\t world\u{200B} ")),
            Some("hello world".to_string())
        );
        assert_eq!(clean_text(Some("a\u{FEFF}b")), Some("ab".to_string()));
        assert_eq!(clean_text(Some("   ")), None);
        assert_eq!(clean_text(Some("\u{200C}")), None);
        assert_eq!(clean_text(None), None);
    }

    #[test]
    fn test_loose_helpers() {
        assert!(is_truthy(Some(&json!("x"))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(is_truthy(Some(&json!([]))));
        assert_eq!(as_count(Some(&json!(12))), Some(12));
        assert_eq!(as_count(Some(&json!(12.0))), Some(12));
        assert_eq!(as_count(Some(&json!(-1))), None);
        assert_eq!(as_count(Some(&json!("12"))), None);
        assert_eq!(as_id(Some(&json!(123_456))), Some("123456".to_string()));
        assert_eq!(as_id(Some(&json!(""))), None);
    }
}
