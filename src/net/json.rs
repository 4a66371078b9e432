//! JSON path extraction for site APIs.
//!
//! Paths use dot notation. An empty path is the value itself, numeric
//! segments index arrays and `*` fans out over every element of an array.
//!
//! ```rust
//! use yomikomi::net::json;
//! use serde_json::json;
//!
//! let data = json!({
//!     "data": [{"name": "A", "genres": [{"name": "x"}, {"name": "y"}]}]
//! });
//!
//! assert_eq!(json::select(&data, "data.0.name").and_then(|v| v.as_str()), Some("A"));
//! let genres: Vec<String> = json::select_all(&data, "data.0.genres.*.name")
//!     .into_iter()
//!     .filter_map(json::to_text)
//!     .collect();
//! assert_eq!(genres, vec!["x", "y"]);
//! ```

use serde_json::Value;

/// Returns the value at `path`, if any. `*` segments are not allowed here.
pub fn select<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;

    for key in segments(path) {
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => current.get(key)?,
        };
    }

    Some(current)
}

/// Returns every value reachable through `path`, expanding `*` segments.
pub fn select_all<'a>(json: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![json];

    for key in segments(path) {
        current = current
            .into_iter()
            .flat_map(|value| -> Vec<&'a Value> {
                match (key, value) {
                    ("*", Value::Array(items)) => items.iter().collect(),
                    (_, Value::Array(items)) => key
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| items.get(i))
                        .into_iter()
                        .collect(),
                    _ => value.get(key).into_iter().collect(),
                }
            })
            .collect();
    }

    current
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .filter(|v| !v.is_null())
        .collect()
}

/// Returns the array at `path`, or `None` when the path is missing or not an
/// array.
pub fn extract_array<'a>(json: &'a Value, path: &str) -> Option<&'a Vec<Value>> {
    select(json, path).and_then(Value::as_array)
}

/// Renders scalars as text. Objects, arrays and nulls give `None`.
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.').filter(|s| !s.is_empty())
}
