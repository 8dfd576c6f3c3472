//! Resource documents with index-aligned deep merge
//!
//! Documents are plain JSON trees (`serde_json::Value`): maps, arrays and
//! scalars. Every resource Deckhand sends to the cluster is built as a default
//! document and then overlaid with the caller's override document.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::Result;

/// A generic resource document with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(pub JsonValue);

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load a document from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a document from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Ok(Self(value))
    }

    /// Parse a document from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Ok(Self(value))
    }

    /// Deep merge an overlay into this document
    ///
    /// Rules:
    /// - Objects: recursive merge, overlay wins at every level
    /// - Arrays: index-aligned merge, extra overlay elements appended
    /// - Scalars (and mismatched types): overlay replaces base
    pub fn merge(&mut self, overlay: &Document) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Get a value by dotted path (e.g., "metadata.name")
    ///
    /// Numeric segments index into arrays, so
    /// `spec.template.spec.containers.0.image` works.
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get a string value by dotted path
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(JsonValue::as_str)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if the document is empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

impl From<JsonValue> for Document {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

/// Return `base` with `overlay` deep merged on top of it
pub fn merged(base: &JsonValue, overlay: &JsonValue) -> JsonValue {
    let mut result = base.clone();
    deep_merge(&mut result, overlay);
    result
}

/// Deep merge two JSON values in place
///
/// Array element `i` of the overlay is merged into element `i` of the base;
/// arrays are never concatenated and never replaced wholesale.
pub fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (JsonValue::Array(base_items), JsonValue::Array(overlay_items)) => {
            for (index, overlay_item) in overlay_items.iter().enumerate() {
                match base_items.get_mut(index) {
                    Some(base_item) => deep_merge(base_item, overlay_item),
                    None => base_items.push(overlay_item.clone()),
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        JsonValue::Array(items) => key
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deep_merge_maps() {
        let mut base = Document::from_yaml(
            r#"
image:
  repository: nginx
  tag: "1.0"
replicas: 1
"#,
        )
        .unwrap();

        let overlay = Document::from_yaml(
            r#"
image:
  tag: "2.0"
  pullPolicy: Always
replicas: 3
"#,
        )
        .unwrap();

        base.merge(&overlay);

        assert_eq!(base.get("image.repository").unwrap(), "nginx");
        assert_eq!(base.get("image.tag").unwrap(), "2.0");
        assert_eq!(base.get("image.pullPolicy").unwrap(), "Always");
        assert_eq!(base.get("replicas").unwrap(), 3);
    }

    #[test]
    fn test_array_merge_is_index_aligned() {
        let base = json!([{"a": 0, "b": 2}]);
        let overlay = json!([{"a": 1}]);

        assert_eq!(merged(&base, &overlay), json!([{"a": 1, "b": 2}]));
    }

    #[test]
    fn test_array_merge_appends_extra_elements() {
        let base = json!({"ports": [{"name": "http", "port": 80}]});
        let overlay = json!({"ports": [{"port": 8080}, {"name": "metrics", "port": 9090}]});

        assert_eq!(
            merged(&base, &overlay),
            json!({"ports": [
                {"name": "http", "port": 8080},
                {"name": "metrics", "port": 9090}
            ]})
        );
    }

    #[test]
    fn test_shorter_override_array_keeps_tail() {
        let base = json!({"args": ["a", "b", "c"]});
        let overlay = json!({"args": ["x"]});

        assert_eq!(merged(&base, &overlay), json!({"args": ["x", "b", "c"]}));
    }

    #[test]
    fn test_nested_containers_merge() {
        let base = json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": "app", "image": "img:1", "ports": [{"name": "http", "containerPort": 8080}]}
            ]}}}
        });
        let overlay = json!({
            "spec": {"template": {"spec": {"containers": [
                {"env": [{"name": "A", "value": "1"}]}
            ]}}}
        });

        let doc = Document(merged(&base, &overlay));
        assert_eq!(
            doc.get_str("spec.template.spec.containers.0.image"),
            Some("img:1")
        );
        assert_eq!(
            doc.get_str("spec.template.spec.containers.0.env.0.name"),
            Some("A")
        );
        assert_eq!(
            doc.get("spec.template.spec.containers.0.ports.0.containerPort"),
            Some(&json!(8080))
        );
    }

    #[test]
    fn test_merge_is_idempotent() {
        let base = json!({
            "metadata": {"labels": {"a": "1"}},
            "list": [{"x": 1}, 2],
            "scalar": "keep"
        });
        let overlay = json!({
            "metadata": {"labels": {"b": "2"}, "annotations": {"c": "3"}},
            "list": [{"y": 2}, {"nested": true}, "extra", ["deep"]],
            "scalar": 7
        });

        let once = merged(&base, &overlay);
        let twice = merged(&once, &overlay);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_type_mismatch_overlay_wins() {
        let base = json!({"a": {"b": 1}, "c": [1, 2]});
        let overlay = json!({"a": "flat", "c": {"k": "v"}});

        assert_eq!(merged(&base, &overlay), json!({"a": "flat", "c": {"k": "v"}}));
    }

    #[test]
    fn test_empty_overlay_is_noop() {
        let base = json!({"a": [1, 2], "b": {"c": null}});
        assert_eq!(merged(&base, &json!({})), base);
        assert_eq!(merged(&base, &json!({"a": []})), base);
    }

    #[test]
    fn test_get_missing_path() {
        let doc = Document(json!({"a": {"b": [1]}}));
        assert!(doc.get("a.c").is_none());
        assert!(doc.get("a.b.3").is_none());
        assert!(doc.get("a.b.x").is_none());
        assert_eq!(doc.get("a.b.0"), Some(&json!(1)));
    }

    #[test]
    fn test_is_empty() {
        assert!(Document::new().is_empty());
        assert!(Document(JsonValue::Null).is_empty());
        assert!(!Document(json!({"a": 1})).is_empty());
    }
}
