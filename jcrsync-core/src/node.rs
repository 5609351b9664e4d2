//! Remote node snapshot with on-demand parsing
//!
//! The JSON returned by the repository is kept raw; each key is converted to a
//! [`Value`] the first time it is read and cached from then on.

use serde_json::{Map, Value as JsonValue};
use std::sync::OnceLock;

use crate::tree::{PropertyTree, is_meta_key, json_to_value};
use crate::value::Value;

/// Shape of an entry, available without parsing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Property,
    Child,
    Meta,
}

#[derive(Debug)]
struct Slot {
    raw: JsonValue,
    parsed: OnceLock<Option<Value>>,
}

/// Snapshot of a remote node as fetched immediately before a write
#[derive(Debug, Default)]
pub struct RemoteNode {
    slots: indexmap::IndexMap<String, Slot>,
}

impl RemoteNode {
    /// Snapshot of a node that does not exist yet
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn from_json(map: Map<String, JsonValue>) -> Self {
        Self {
            slots: map
                .into_iter()
                .map(|(k, raw)| {
                    (
                        k,
                        Slot {
                            raw,
                            parsed: OnceLock::new(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn kind(&self, key: &str) -> Option<EntryKind> {
        let slot = self.slots.get(key)?;
        Some(if is_meta_key(key) {
            EntryKind::Meta
        } else if slot.raw.is_object() {
            EntryKind::Child
        } else {
            EntryKind::Property
        })
    }

    /// Child node names in remote order
    pub fn child_names(&self) -> Vec<&str> {
        self.keys()
            .filter(|k| self.kind(k) == Some(EntryKind::Child))
            .collect()
    }

    /// Parsed value of `key`, converting it on first access
    pub fn get(&self, key: &str) -> Option<&Value> {
        let slot = self.slots.get(key)?;
        slot.parsed.get_or_init(|| json_to_value(&slot.raw)).as_ref()
    }

    /// Number of entries parsed so far
    pub fn parsed_count(&self) -> usize {
        self.slots.values().filter(|s| s.parsed.get().is_some()).count()
    }

    /// Materialize every entry
    pub fn to_tree(&self) -> PropertyTree {
        self.keys()
            .filter_map(|k| self.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(json: JsonValue) -> RemoteNode {
        match json {
            JsonValue::Object(map) => RemoteNode::from_json(map),
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_lazy_parsing() {
        let remote = node(json!({
            "jcr:primaryType": "nt:unstructured",
            "title": "Old",
            "tags": ["a", "b"],
            "child": {}
        }));
        assert_eq!(remote.parsed_count(), 0);
        assert_eq!(remote.get("title"), Some(&Value::from("Old")));
        assert_eq!(remote.parsed_count(), 1);
        assert_eq!(remote.get("title"), Some(&Value::from("Old")));
        assert_eq!(remote.parsed_count(), 1);
    }

    #[test]
    fn test_entry_kinds() {
        let remote = node(json!({
            "title": "x",
            ":jcr:data": 42,
            "child": { "jcr:primaryType": "nt:unstructured" },
            "other": {}
        }));
        assert_eq!(remote.kind("title"), Some(EntryKind::Property));
        assert_eq!(remote.kind(":jcr:data"), Some(EntryKind::Meta));
        assert_eq!(remote.kind("child"), Some(EntryKind::Child));
        assert_eq!(remote.kind("nope"), None);
        assert_eq!(remote.child_names(), vec!["child", "other"]);
        assert_eq!(remote.parsed_count(), 0);
    }

    #[test]
    fn test_null_entries_parse_to_nothing() {
        let remote = node(json!({ "gone": null, "kept": 1 }));
        assert_eq!(remote.get("gone"), None);
        assert_eq!(remote.to_tree().keys().collect::<Vec<_>>(), vec!["kept"]);
    }
}
