//! Tolerant accessors over the vision-AI JSON blobs.
//!
//! The vision model output varies per document type and per prompt revision,
//! so every accessor degrades to "absent" instead of failing. Strategies
//! decide what absence means.

use serde_json::Value;
use tracing::warn;

/// One page worth of vision JSON.
#[derive(Debug, Clone)]
pub struct PageData {
    pub page_number: i32,
    pub content: Value,
}

/// Normalize a stored blob into per-page content values.
///
/// Root-level structures are canonical. A `{"pages": [...]}` envelope is
/// legacy output of older vision prompts; it is unwrapped here and logged so
/// operators can spot documents that still need re-processing.
pub fn unwrap_pages(raw: &Value, default_page: i32) -> Vec<PageData> {
    if let Some(pages) = raw.get("pages").and_then(Value::as_array) {
        warn!(
            page = default_page,
            "Legacy pages-wrapped vision JSON encountered, unwrapping"
        );
        return pages
            .iter()
            .map(|entry| PageData {
                page_number: entry
                    .get("page_number")
                    .and_then(Value::as_i64)
                    .map(|n| n as i32)
                    .unwrap_or(default_page),
                content: entry.get("content").cloned().unwrap_or_else(|| entry.clone()),
            })
            .collect();
    }

    vec![PageData {
        page_number: default_page,
        content: raw.clone(),
    }]
}

/// String field, trimmed; `None` when absent, non-string, or blank.
pub fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// String field rendered from any scalar (numbers and bools included).
pub fn scalar_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// List field: accepts an array of strings/scalars or a single string.
pub fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(render_scalar).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

/// Array field of objects; empty when absent.
pub fn object_list(value: &Value, key: &str) -> Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|items| items.to_vec())
        .unwrap_or_default()
}

fn render_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Object(_) => Some(render_lines(value)),
        _ => None,
    }
}

/// Render an arbitrary value as readable `key: value` lines. Used for
/// metadata-style chunks where the schema is open-ended.
pub fn render_lines(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .filter_map(|(key, val)| {
                let rendered = match val {
                    Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Array(items) => {
                        let parts: Vec<String> =
                            items.iter().filter_map(render_scalar).collect();
                        if parts.is_empty() {
                            return None;
                        }
                        parts.join(", ")
                    }
                    Value::Object(_) => render_lines(val),
                    _ => return None,
                };
                Some(format!("{}: {}", key, rendered))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(render_scalar)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
    }
}

/// True when the value carries no usable content (null, empty string,
/// empty array/object, or an object whose members are all empty).
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.iter().all(is_empty_value),
        Value::Object(map) => map.values().all(is_empty_value),
        _ => false,
    }
}

/// Make a fragment usable inside a chunk identifier: lowercase alnum with
/// underscores, collapsed.
pub fn sanitize_id_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_underscore = false;
        } else if !last_underscore && !out.is_empty() {
            out.push('_');
            last_underscore = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_level_is_single_page() {
        let raw = json!({"text": "Inhalt"});
        let pages = unwrap_pages(&raw, 3);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 3);
        assert_eq!(pages[0].content["text"], "Inhalt");
    }

    #[test]
    fn test_legacy_pages_envelope_unwrapped() {
        let raw = json!({
            "pages": [
                {"page_number": 1, "content": {"text": "Seite eins"}},
                {"page_number": 2, "content": {"text": "Seite zwei"}}
            ]
        });
        let pages = unwrap_pages(&raw, 9);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[1].content["text"], "Seite zwei");
    }

    #[test]
    fn test_string_list_accepts_scalar() {
        let value = json!({"warnings": "Kann Augenreizung verursachen."});
        assert_eq!(
            string_list(&value, "warnings"),
            vec!["Kann Augenreizung verursachen.".to_string()]
        );
    }

    #[test]
    fn test_render_lines_flattens_nested_objects() {
        let value = json!({"titel": "WA-001", "umfang": {"bereich": "Montage"}});
        let rendered = render_lines(&value);
        assert!(rendered.contains("titel: WA-001"));
        assert!(rendered.contains("bereich: Montage"));
    }

    #[test]
    fn test_is_empty_value() {
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!({"a": "", "b": []})));
        assert!(!is_empty_value(&json!({"a": "x"})));
    }

    #[test]
    fn test_sanitize_id_fragment() {
        assert_eq!(sanitize_id_fragment("Variante 5 ml / Tube"), "variante_5_ml_tube");
        assert_eq!(sanitize_id_fragment("***"), "unnamed");
    }
}
