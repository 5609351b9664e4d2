//! Diff-Based Property Writer
//!
//! Reconciles a remote node with a desired [`PropertyTree`]:
//!
//! 1. fetch the current node (a 404 means "does not exist yet")
//! 2. compare field by field and build one [`Mutation`] for the level
//! 3. post the mutation, delete unwanted children concurrently
//! 4. recurse into desired children one after another, in desired order
//!
//! Nothing is locked between the fetch and the write. A field changed
//! remotely in between is overwritten only if this write touches it too.

use futures::future::{BoxFuture, FutureExt, try_join_all};
use std::collections::HashSet;

use crate::error::{JcrError, Result};
use crate::node::{EntryKind, RemoteNode};
use crate::transport::{
    DELETE_SUFFIX, FetchDepth, FormFields, ORDER_KEY, PATCH_SUFFIX, TYPE_HINT_SUFFIX, Transport,
};
use crate::tree::{PropertyTree, is_internal_property, is_meta_key, meta_base};
use crate::value::{PropertyType, Scalar, Timestamp, TypeTag, Value};

/// Options for one reconciliation
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Properties never compared nor written, on every level
    pub ignored_properties: HashSet<String>,
    /// Delete remote properties missing from the desired tree. Only applied
    /// to nodes whose desired tree declares `jcr:primaryType`.
    pub delete_absent_properties: bool,
    /// Delete remote children missing from the desired tree
    pub delete_absent_children: bool,
    /// Position of the root node among its siblings
    pub order: Option<usize>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore(mut self, name: impl Into<String>) -> Self {
        self.ignored_properties.insert(name.into());
        self
    }

    pub fn delete_absent_properties(mut self, enabled: bool) -> Self {
        self.delete_absent_properties = enabled;
        self
    }

    pub fn delete_absent_children(mut self, enabled: bool) -> Self {
        self.delete_absent_children = enabled;
        self
    }

    pub fn order(mut self, index: usize) -> Self {
        self.order = Some(index);
        self
    }

    fn is_ignored(&self, name: &str) -> bool {
        is_internal_property(name) || self.ignored_properties.contains(name)
    }
}

/// A single field-level change
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Set a single value
    Set {
        name: String,
        value: String,
        type_hint: Option<PropertyType>,
    },
    /// Replace a multi-value property wholesale
    Replace {
        name: String,
        values: Vec<String>,
        type_hint: PropertyType,
    },
    /// Remove the listed elements from a multi-value property
    PatchRemove { name: String, values: Vec<String> },
    /// Remove the property
    Delete { name: String },
    /// Move the node to this index among its siblings
    Order(usize),
}

impl FieldOp {
    fn write_fields(&self, fields: &mut FormFields) {
        match self {
            FieldOp::Set {
                name,
                value,
                type_hint,
            } => {
                fields.push(name.as_str(), value.as_str());
                if let Some(hint) = type_hint {
                    fields.push(format!("{}{}", name, TYPE_HINT_SUFFIX), hint.to_string());
                }
            }
            FieldOp::Replace {
                name,
                values,
                type_hint,
            } => {
                fields.push(format!("{}{}", name, TYPE_HINT_SUFFIX), type_hint.to_string());
                for value in values {
                    fields.push(name.as_str(), value.as_str());
                }
            }
            FieldOp::PatchRemove { name, values } => {
                fields.push(format!("{}{}", name, PATCH_SUFFIX), "true");
                for value in values {
                    fields.push(name.as_str(), format!("-{}", value));
                }
            }
            FieldOp::Delete { name } => {
                fields.push(format!("{}{}", name, DELETE_SUFFIX), "");
            }
            FieldOp::Order(index) => fields.push(ORDER_KEY, index.to_string()),
        }
    }
}

/// Field operations for one node, applied by a single POST
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mutation {
    ops: Vec<FieldOp>,
}

impl Mutation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: FieldOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[FieldOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn to_fields(&self) -> FormFields {
        let mut fields = FormFields::new();
        for op in &self.ops {
            op.write_fields(&mut fields);
        }
        fields
    }
}

/// Join a child name onto a repository path
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Result of comparing one level
#[derive(Debug, Default)]
struct LevelPlan {
    mutation: Mutation,
    deletions: Vec<String>,
    children: Vec<(String, PropertyTree)>,
}

/// Compute the mutation for one level of the tree.
///
/// `desired` has already been stripped of ignored properties; metadata keys
/// present only remotely are copied into it so they pass through unexamined.
fn plan_level(
    current: &RemoteNode,
    desired: &mut PropertyTree,
    options: &SaveOptions,
    order: Option<usize>,
) -> LevelPlan {
    let mut plan = LevelPlan::default();
    let guards_primary_type = desired.primary_type().is_some();

    for key in current.keys() {
        if desired.contains_key(key) || options.is_ignored(key) {
            continue;
        }
        match current.kind(key) {
            Some(EntryKind::Meta) => {
                if let Some(value) = current.get(key) {
                    desired.insert(key, value.clone());
                }
            }
            Some(EntryKind::Child) => {
                if options.delete_absent_children {
                    plan.deletions.push(key.to_string());
                }
            }
            Some(EntryKind::Property) => {
                if options.delete_absent_properties && guards_primary_type {
                    plan.mutation.push(FieldOp::Delete {
                        name: key.to_string(),
                    });
                }
            }
            None => {}
        }
    }

    for (key, value) in desired.iter() {
        if is_meta_key(key) {
            // structured sub-object without a typed sibling property
            let paired_is_property = meta_base(key)
                .and_then(|base| desired.get(base))
                .is_some_and(|v| !v.is_node());
            if let Value::Node(tree) = value {
                if !paired_is_property {
                    plan.children.push((key.to_string(), tree.clone()));
                }
            }
            continue;
        }

        match value {
            Value::Node(tree) => plan.children.push((key.to_string(), tree.clone())),
            Value::Array(items) => {
                if let Some(op) = diff_array(key, items, current.get(key), desired.type_hint(key)) {
                    plan.mutation.push(op);
                }
            }
            Value::Scalar(scalar) => {
                if let Some(op) = diff_scalar(key, scalar, current.get(key), desired.type_hint(key)) {
                    plan.mutation.push(op);
                }
            }
        }
    }

    if let Some(index) = order {
        plan.mutation.push(FieldOp::Order(index));
    }
    plan
}

fn diff_scalar(
    name: &str,
    desired: &Scalar,
    current: Option<&Value>,
    hint: Option<PropertyType>,
) -> Option<FieldOp> {
    let wanted = desired.to_string();
    if let Some(Value::Scalar(existing)) = current {
        // compare renderings so 5 and 5.0 are not a change
        if existing.to_string() == wanted || same_date(desired, existing) {
            return None;
        }
    }
    let type_hint = hint.or_else(|| match desired.type_tag() {
        TypeTag::String => None,
        tag => Some(PropertyType::single(tag)),
    });
    Some(FieldOp::Set {
        name: name.to_string(),
        value: wanted,
        type_hint,
    })
}

/// Dates compare by instant; the repository renders them in its own format
fn same_date(desired: &Scalar, existing: &Scalar) -> bool {
    let Scalar::Date(wanted) = desired else {
        return false;
    };
    Timestamp::parse_remote(&existing.to_string()).is_some_and(|have| have.same_instant(wanted))
}

fn diff_array(
    name: &str,
    desired: &[Scalar],
    current: Option<&Value>,
    hint: Option<PropertyType>,
) -> Option<FieldOp> {
    let wanted: Vec<String> = desired.iter().map(Scalar::to_string).collect();
    match current {
        None if wanted.is_empty() => None,
        Some(Value::Array(items)) => {
            let existing: Vec<String> = items.iter().map(Scalar::to_string).collect();
            if existing == wanted {
                None
            } else if wanted.is_empty() {
                Some(FieldOp::PatchRemove {
                    name: name.to_string(),
                    values: existing,
                })
            } else {
                Some(replace(name, desired, wanted, hint))
            }
        }
        Some(Value::Scalar(_)) if wanted.is_empty() => Some(FieldOp::Delete {
            name: name.to_string(),
        }),
        _ => Some(replace(name, desired, wanted, hint)),
    }
}

fn replace(name: &str, desired: &[Scalar], values: Vec<String>, hint: Option<PropertyType>) -> FieldOp {
    let tag = desired.first().map(Scalar::type_tag).unwrap_or(TypeTag::String);
    FieldOp::Replace {
        name: name.to_string(),
        values,
        type_hint: PropertyType::array(hint.map(|h| h.tag).unwrap_or(tag)),
    }
}

/// Reconciles remote nodes against desired trees through a [`Transport`]
pub struct PropertyWriter<'a, T: Transport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> PropertyWriter<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Make the node at `path` match `desired`; returns the changed paths
    pub async fn reconcile(
        &self,
        path: &str,
        desired: &PropertyTree,
        options: &SaveOptions,
    ) -> Result<Vec<String>> {
        tracing::debug!("Reconciling {}", path);
        let changed = self
            .process_node(path.to_string(), desired.clone(), options, options.order)
            .await?;
        if changed.is_empty() {
            tracing::debug!("{} already up to date", path);
        } else {
            tracing::info!("Saved {} ({} paths changed)", path, changed.len());
        }
        Ok(changed)
    }

    fn process_node<'b>(
        &'b self,
        path: String,
        mut desired: PropertyTree,
        options: &'b SaveOptions,
        order: Option<usize>,
    ) -> BoxFuture<'b, Result<Vec<String>>> {
        async move {
            let current = self.fetch_current(&path).await?;
            desired.retain(|key, _| !options.is_ignored(key));

            let plan = plan_level(&current, &mut desired, options, order);
            let mut changed = Vec::new();

            if !plan.mutation.is_empty() {
                tracing::debug!("POST {} ({} field operations)", path, plan.mutation.len());
                let response = self
                    .transport
                    .post(&path, &plan.mutation.to_fields())
                    .await
                    .map_err(|e| fail(&path, "save properties", e))?;
                changed.extend(response.changes);
            }

            if !plan.deletions.is_empty() {
                let deletes = plan.deletions.iter().map(|name| {
                    let child = join_path(&path, name);
                    async move {
                        tracing::debug!("Deleting {}", child);
                        let response = self
                            .transport
                            .post(&child, &FormFields::delete_node())
                            .await
                            .map_err(|e| fail(&child, "delete node", e))?;
                        Ok::<_, JcrError>(if response.changes.is_empty() {
                            vec![child]
                        } else {
                            response.changes
                        })
                    }
                });
                for paths in try_join_all(deletes).await? {
                    changed.extend(paths);
                }
            }

            let reorder = needs_reorder(&current, &plan.children);
            for (index, (name, tree)) in plan.children.into_iter().enumerate() {
                let child_order = if reorder { Some(index) } else { None };
                let child_changes = self
                    .process_node(join_path(&path, &name), tree, options, child_order)
                    .await?;
                changed.extend(child_changes);
            }

            Ok(changed)
        }
        .boxed()
    }

    async fn fetch_current(&self, path: &str) -> Result<RemoteNode> {
        match self.transport.fetch_json(path, FetchDepth::Shallow).await {
            Ok(json) => Ok(RemoteNode::from_json(json)),
            Err(e) if e.is_not_found() => {
                tracing::debug!("{} does not exist yet", path);
                Ok(RemoteNode::missing())
            }
            Err(e) => Err(fail(path, "fetch current state", e)),
        }
    }
}

fn fail(path: &str, action: &str, err: crate::error::TransportError) -> JcrError {
    let err = JcrError::wrap(path, action, err);
    tracing::error!("{}", err);
    err
}

/// Whether the desired children appear in a different relative order than
/// the remote ones they share
fn needs_reorder(current: &RemoteNode, desired: &[(String, PropertyTree)]) -> bool {
    let wanted: Vec<&str> = desired
        .iter()
        .map(|(name, _)| name.as_str())
        .filter(|name| !is_meta_key(name))
        .collect();
    let existing: Vec<&str> = current
        .child_names()
        .into_iter()
        .filter(|name| wanted.contains(name))
        .collect();
    existing
        .iter()
        .zip(wanted.iter())
        .any(|(have, want)| have != want)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote(json: serde_json::Value) -> RemoteNode {
        RemoteNode::from_json(json.as_object().cloned().unwrap())
    }

    #[test]
    fn test_single_changed_field() {
        let current = remote(json!({"jcr:primaryType": "nt:unstructured", "title": "Old"}));
        let mut desired = PropertyTree::new()
            .with("jcr:primaryType", "nt:unstructured")
            .with("title", "New");
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);

        assert_eq!(
            plan.mutation.ops(),
            &[FieldOp::Set {
                name: "title".into(),
                value: "New".into(),
                type_hint: None
            }]
        );
        assert_eq!(plan.mutation.to_fields(), FormFields::new().with("title", "New"));
    }

    #[test]
    fn test_numeric_rendering_is_not_a_change() {
        let current = remote(json!({"count": 5}));
        let mut desired = PropertyTree::new().with("count", 5.0);
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);
        assert!(plan.mutation.is_empty());
    }

    fn date(text: &str) -> Value {
        Value::Scalar(Scalar::Date(Timestamp::parse(text).unwrap()))
    }

    #[test]
    fn test_same_instant_in_remote_date_format_is_not_a_change() {
        let current = remote(json!({
            "released": "Tue Mar 05 2024 10:12:33 GMT+0100",
            "updated": "Tue Mar 05 2024 10:12:33 GMT+0100"
        }));
        let mut desired = PropertyTree::new()
            .with("released", date("2024-03-05T09:12:33.000Z"))
            .with("updated", date("2024-03-06T09:12:33.000Z"));
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);

        let fields = plan.mutation.to_fields();
        assert!(!fields.contains("released"));
        assert_eq!(fields.get("updated"), Some("2024-03-06T09:12:33.000Z"));
        assert_eq!(fields.get("updated@TypeHint"), Some("Date"));
    }

    #[test]
    fn test_emptied_array_is_patched() {
        let current = remote(json!({"tags": ["a", "b"]}));
        let mut desired = PropertyTree::new().with("tags", Value::strings(Vec::<String>::new()));
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);

        let fields = plan.mutation.to_fields();
        assert_eq!(fields.get("tags@Patch"), Some("true"));
        assert_eq!(fields.get_all("tags"), vec!["-a", "-b"]);
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_changed_array_is_replaced() {
        let current = remote(json!({"tags": ["a"]}));
        let mut desired = PropertyTree::new().with("tags", Value::strings(["a", "b"]));
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);

        let fields = plan.mutation.to_fields();
        assert_eq!(fields.get("tags@TypeHint"), Some("String[]"));
        assert_eq!(fields.get_all("tags"), vec!["a", "b"]);
    }

    #[test]
    fn test_equal_array_and_missing_empty_array_are_no_ops() {
        let current = remote(json!({"tags": ["a", "b"]}));
        let mut desired = PropertyTree::new()
            .with("tags", Value::strings(["a", "b"]))
            .with("none", Value::strings(Vec::<String>::new()));
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);
        assert!(plan.mutation.is_empty());
    }

    #[test]
    fn test_type_hints() {
        let current = remote(json!({}));
        let mut desired = PropertyTree::new()
            .with("count", 3i64)
            .with("flag", true)
            .with("ref", "abc");
        desired.set_type_hint("ref", PropertyType::single(TypeTag::WeakReference));
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);

        let fields = plan.mutation.to_fields();
        assert_eq!(fields.get("count@TypeHint"), Some("Long"));
        assert_eq!(fields.get("flag@TypeHint"), Some("Boolean"));
        assert_eq!(fields.get("ref@TypeHint"), Some("WeakReference"));
        assert!(!fields.contains(":ref"));
    }

    #[test]
    fn test_absent_property_deletion_is_gated() {
        let current = remote(json!({"jcr:primaryType": "nt:unstructured", "stale": "x"}));

        let mut desired = PropertyTree::new().with("jcr:primaryType", "nt:unstructured");
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);
        assert!(plan.mutation.is_empty());

        let opts = SaveOptions::new().delete_absent_properties(true);
        let mut desired = PropertyTree::new().with("jcr:primaryType", "nt:unstructured");
        let plan = plan_level(&current, &mut desired, &opts, None);
        assert_eq!(plan.mutation.to_fields(), FormFields::new().with("stale@Delete", ""));

        // no primary type: treated as a partial tree
        let mut partial = PropertyTree::new().with("other", "y");
        let plan = plan_level(&current, &mut partial, &opts, None);
        assert!(!plan.mutation.to_fields().contains("stale@Delete"));
    }

    #[test]
    fn test_absent_children_deletion_is_gated() {
        let current = remote(json!({"keep": {}, "drop": {}}));
        let mut desired = PropertyTree::new().with("keep", PropertyTree::new());

        let plan = plan_level(&current, &mut desired.clone(), &SaveOptions::new(), None);
        assert!(plan.deletions.is_empty());

        let opts = SaveOptions::new().delete_absent_children(true);
        let plan = plan_level(&current, &mut desired, &opts, None);
        assert_eq!(plan.deletions, vec!["drop".to_string()]);
    }

    #[test]
    fn test_metadata_passes_through() {
        let current = remote(json!({":jcr:data": 1024, "jcr:primaryType": "nt:resource"}));
        let mut desired = PropertyTree::new().with("jcr:primaryType", "nt:resource");
        let plan = plan_level(
            &current,
            &mut desired,
            &SaveOptions::new().delete_absent_properties(true),
            None,
        );
        assert!(plan.mutation.is_empty());
        assert!(desired.contains_key(":jcr:data"));
    }

    #[test]
    fn test_structured_metadata_is_a_child() {
        let current = remote(json!({}));
        let mut desired = PropertyTree::new()
            .with(":composite", PropertyTree::new().with("a", "b"))
            .with("title", "t")
            .with(":title", "String");
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), None);
        let names: Vec<&str> = plan.children.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec![":composite"]);
    }

    #[test]
    fn test_order_directive() {
        let current = remote(json!({"title": "t"}));
        let mut desired = PropertyTree::new().with("title", "t");
        let plan = plan_level(&current, &mut desired, &SaveOptions::new(), Some(2));
        assert_eq!(plan.mutation.to_fields(), FormFields::new().with(":order", "2"));
    }

    #[test]
    fn test_needs_reorder() {
        let current = remote(json!({"a": {}, "b": {}}));
        let child = |n: &str| (n.to_string(), PropertyTree::new());

        assert!(needs_reorder(&current, &[child("b"), child("a")]));
        assert!(!needs_reorder(&current, &[child("a"), child("b")]));
        assert!(!needs_reorder(&current, &[child("a"), child("b"), child("c")]));
        assert!(needs_reorder(&current, &[child("c"), child("a"), child("b")]));
        assert!(!needs_reorder(&current, &[child("b")]));
    }

    #[test]
    fn test_structured_metadata_does_not_force_reorder() {
        let current = remote(json!({"a": {}}));
        let child = |n: &str| (n.to_string(), PropertyTree::new());

        assert!(!needs_reorder(&current, &[child(":composite"), child("a")]));

        let current = remote(json!({"a": {}, "b": {}}));
        assert!(needs_reorder(&current, &[child(":composite"), child("b"), child("a")]));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "content"), "/content");
        assert_eq!(join_path("/content", "site"), "/content/site");
    }
}
