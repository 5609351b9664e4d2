//! Property Tree
//!
//! Ordered mapping from property and child names to [`Value`]s. Keys that
//! start with [`META_PREFIX`] carry metadata about the sibling property of the
//! same base name (a type hint such as `:count = "Long"`), or structured
//! sub-objects that are not real properties.

use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};

use crate::value::{PropertyType, Scalar, Value};

/// Marker for metadata keys
pub const META_PREFIX: char = ':';

/// Primary node type property
pub const PRIMARY_TYPE: &str = "jcr:primaryType";

/// System-managed audit and versioning properties. Never round-tripped
/// through content files and never written back to the repository.
pub const INTERNAL_PROPERTIES: &[&str] = &[
    "jcr:created",
    "jcr:createdBy",
    "jcr:lastModified",
    "jcr:lastModifiedBy",
    "jcr:uuid",
    "jcr:baseVersion",
    "jcr:predecessors",
    "jcr:versionHistory",
    "jcr:isCheckedOut",
    "cq:lastModified",
    "cq:lastModifiedBy",
    "cq:lastReplicated",
    "cq:lastReplicatedBy",
    "cq:lastReplicationAction",
];

pub fn is_meta_key(name: &str) -> bool {
    name.starts_with(META_PREFIX)
}

pub fn is_internal_property(name: &str) -> bool {
    INTERNAL_PROPERTIES.contains(&name)
}

/// `title` -> `:title`
pub fn meta_key(name: &str) -> String {
    format!("{}{}", META_PREFIX, name)
}

/// `:title` -> `title`
pub fn meta_base(name: &str) -> Option<&str> {
    name.strip_prefix(META_PREFIX)
}

/// A node's properties and children, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyTree {
    entries: IndexMap<String, Value>,
}

impl PropertyTree {
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.entries.get_mut(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Insert or replace; a replaced key keeps its position
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(name.into(), value.into())
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.entries.shift_remove(name)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &Value) -> bool) {
        self.entries.retain(|k, v| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Child nodes, excluding metadata sub-objects
    pub fn children(&self) -> impl Iterator<Item = (&str, &PropertyTree)> {
        self.iter().filter_map(|(k, v)| match v {
            Value::Node(tree) if !is_meta_key(k) => Some((k, tree)),
            _ => None,
        })
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children().map(|(k, _)| k).collect()
    }

    /// Scalar and array properties, excluding metadata
    pub fn properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.iter()
            .filter(|(k, v)| !v.is_node() && !is_meta_key(k))
    }

    pub fn has_properties(&self) -> bool {
        self.properties().next().is_some()
    }

    pub fn primary_type(&self) -> Option<&str> {
        self.get(PRIMARY_TYPE).and_then(Value::as_str)
    }

    /// Explicit type hint recorded for `name`, if any
    pub fn type_hint(&self, name: &str) -> Option<PropertyType> {
        self.get(&meta_key(name))
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
    }

    pub fn set_type_hint(&mut self, name: &str, hint: PropertyType) {
        self.insert(meta_key(name), hint.to_string());
    }

    /// Copy with every child reduced to an empty placeholder node
    pub fn with_placeholder_children(&self) -> Self {
        self.iter()
            .map(|(k, v)| match v {
                Value::Node(_) => (k.to_string(), Value::Node(PropertyTree::new())),
                other => (k.to_string(), other.clone()),
            })
            .collect()
    }

    /// Copy without any child nodes
    pub fn without_children(&self) -> Self {
        self.iter()
            .filter(|(_, v)| !v.is_node())
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Copy keeping only child nodes
    pub fn only_children(&self) -> Self {
        self.iter()
            .filter(|(_, v)| v.is_node())
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Convert Sling JSON output into a tree.
    ///
    /// Integral numbers become longs, other numbers doubles, objects child
    /// nodes. `null` entries are dropped.
    pub fn from_json(map: &Map<String, JsonValue>) -> Self {
        map.iter()
            .filter_map(|(k, v)| json_to_value(v).map(|value| (k.clone(), value)))
            .collect()
    }

    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::new();
        for (k, v) in self.iter() {
            let json = match v {
                Value::Scalar(s) => scalar_to_json(s),
                Value::Array(items) => JsonValue::Array(items.iter().map(scalar_to_json).collect()),
                Value::Node(tree) => tree.to_json(),
            };
            map.insert(k.to_string(), json);
        }
        JsonValue::Object(map)
    }
}

impl FromIterator<(String, Value)> for PropertyTree {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a PropertyTree {
    type Item = (&'a String, &'a Value);
    type IntoIter = indexmap::map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

pub(crate) fn json_to_value(json: &JsonValue) -> Option<Value> {
    match json {
        JsonValue::Null => None,
        JsonValue::Array(items) => Some(Value::Array(
            items.iter().filter_map(json_to_scalar).collect(),
        )),
        JsonValue::Object(map) => Some(Value::Node(PropertyTree::from_json(map))),
        other => json_to_scalar(other).map(Value::Scalar),
    }
}

fn json_to_scalar(json: &JsonValue) -> Option<Scalar> {
    match json {
        JsonValue::String(s) => Some(Scalar::String(s.clone())),
        JsonValue::Bool(b) => Some(Scalar::Boolean(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Long(i)),
            None => n.as_f64().map(Scalar::Double),
        },
        _ => None,
    }
}

fn scalar_to_json(scalar: &Scalar) -> JsonValue {
    match scalar {
        Scalar::String(s) => JsonValue::String(s.clone()),
        Scalar::Boolean(b) => JsonValue::Bool(*b),
        Scalar::Long(n) => JsonValue::Number((*n).into()),
        Scalar::Double(n) => Number::from_f64(*n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Scalar::Date(ts) => JsonValue::String(ts.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::TypeTag;
    use serde_json::json;

    #[test]
    fn test_from_json_shapes() {
        let json = json!({
            "jcr:primaryType": "nt:unstructured",
            "count": 3,
            "ratio": 0.5,
            "enabled": true,
            "tags": ["a", "b"],
            "gone": null,
            "child": { "jcr:primaryType": "nt:unstructured" }
        });
        let tree = PropertyTree::from_json(json.as_object().unwrap());

        assert_eq!(tree.primary_type(), Some("nt:unstructured"));
        assert_eq!(tree.get("count"), Some(&Value::from(3i64)));
        assert_eq!(tree.get("ratio"), Some(&Value::from(0.5)));
        assert_eq!(tree.get("enabled"), Some(&Value::from(true)));
        assert_eq!(tree.get("tags"), Some(&Value::strings(["a", "b"])));
        assert!(!tree.contains_key("gone"));
        assert_eq!(tree.child_names(), vec!["child"]);
        assert_eq!(tree.to_json()["count"], json!(3));
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut tree = PropertyTree::new()
            .with("a", "1")
            .with("b", "2")
            .with("c", "3");
        tree.remove("a");
        assert_eq!(tree.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }

    #[test]
    fn test_type_hint_side_channel() {
        let mut tree = PropertyTree::new().with("ref", "1234-abcd");
        tree.set_type_hint("ref", PropertyType::single(TypeTag::WeakReference));

        assert_eq!(tree.get(":ref"), Some(&Value::from("WeakReference")));
        assert_eq!(
            tree.type_hint("ref"),
            Some(PropertyType::single(TypeTag::WeakReference))
        );
        // metadata is neither a property nor a child
        assert_eq!(tree.properties().count(), 1);
        assert!(tree.child_names().is_empty());
    }

    #[test]
    fn test_placeholder_children() {
        let tree = PropertyTree::new()
            .with("title", "x")
            .with("child", PropertyTree::new().with("deep", "y"));
        let shallow = tree.with_placeholder_children();
        assert_eq!(shallow.get("child"), Some(&Value::Node(PropertyTree::new())));
        assert_eq!(tree.without_children().len(), 1);
        assert_eq!(tree.only_children().keys().collect::<Vec<_>>(), vec!["child"]);
    }

    #[test]
    fn test_internal_properties() {
        assert!(is_internal_property("jcr:lastModified"));
        assert!(!is_internal_property(PRIMARY_TYPE));
        assert_eq!(meta_base(":title"), Some("title"));
        assert_eq!(meta_key("title"), ":title");
    }
}
