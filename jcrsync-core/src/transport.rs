//! Transport abstraction
//!
//! The core never talks HTTP itself; everything remote goes through a
//! [`Transport`]. `jcrsync-http` provides the Sling implementation, tests use
//! in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::TransportError;

/// Companion field carrying an explicit property type
pub const TYPE_HINT_SUFFIX: &str = "@TypeHint";

/// Companion field requesting removal of a property
pub const DELETE_SUFFIX: &str = "@Delete";

/// Companion field switching a multi-value field to add/remove semantics
pub const PATCH_SUFFIX: &str = "@Patch";

/// Position of the node among its siblings
pub const ORDER_KEY: &str = ":order";

/// Node-level operation selector (`delete`, `move`, ...)
pub const OPERATION_KEY: &str = ":operation";

/// Batch of structural changes (`>src : dst` moves)
pub const DIFF_KEY: &str = ":diff";

/// How deep a JSON fetch descends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDepth {
    /// Properties only
    Properties,
    /// Properties plus immediate children
    Shallow,
    /// Whole subtree
    Infinity,
}

impl FetchDepth {
    /// Sling selector for the depth (`0`, `1`, `infinity`)
    pub fn selector(self) -> &'static str {
        match self {
            FetchDepth::Properties => "0",
            FetchDepth::Shallow => "1",
            FetchDepth::Infinity => "infinity",
        }
    }
}

/// Ordered multi-map of form fields for a POST
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: Vec<(String, String)>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// All values sent under `name`, in order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.iter().filter(|(k, _)| *k == name).map(|(_, v)| v).collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Form for deleting the node the request is posted to
    pub fn delete_node() -> Self {
        Self::new().with(OPERATION_KEY, "delete")
    }
}

/// Outcome of a POST
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostResponse {
    /// Remote paths touched by the request
    pub changes: Vec<String>,
}

/// Binary content for a file upload
#[derive(Debug, Clone)]
pub struct FileUpload {
    /// Node name of the file
    pub name: String,
    pub content: Bytes,
    pub mime_type: String,
}

/// QueryBuilder-style query made of ordered predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    predicates: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn predicate(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.predicates.push((name.into(), value.into()));
        self
    }

    pub fn path(self, path: &str) -> Self {
        self.predicate("path", path)
    }

    pub fn node_type(self, node_type: &str) -> Self {
        self.predicate("type", node_type)
    }

    pub fn fulltext(self, text: &str) -> Self {
        self.predicate("fulltext", text)
    }

    /// Adds a numbered `property`/`property.value` pair
    pub fn property(self, name: &str, value: &str) -> Self {
        let n = self
            .predicates
            .iter()
            .filter(|(k, _)| k.ends_with("_property"))
            .count()
            + 1;
        self.predicate(format!("{}_property", n), name)
            .predicate(format!("{}_property.value", n), value)
    }

    pub fn limit(self, limit: i64) -> Self {
        self.predicate("p.limit", limit.to_string())
    }

    pub fn predicates(&self) -> &[(String, String)] {
        &self.predicates
    }
}

/// Query results
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub hits: Vec<JsonValue>,
}

impl QueryResult {
    /// `path` of every hit that reports one
    pub fn paths(&self) -> Vec<&str> {
        self.hits
            .iter()
            .filter_map(|hit| hit.get("path").and_then(JsonValue::as_str))
            .collect()
    }
}

/// Remote repository access used by the core
#[async_trait]
pub trait Transport: Send + Sync {
    /// Host the transport is bound to (scheme, host and port)
    fn host(&self) -> &str;

    /// Fetch a node as JSON; a missing node is a `Status` error with 404
    async fn fetch_json(
        &self,
        path: &str,
        depth: FetchDepth,
    ) -> Result<Map<String, JsonValue>, TransportError>;

    /// Post form fields to `path`
    async fn post(&self, path: &str, fields: &FormFields) -> Result<PostResponse, TransportError>;

    /// Multipart upload of a file below `parent`
    async fn upload(&self, parent: &str, file: FileUpload) -> Result<PostResponse, TransportError>;

    async fn query(&self, query: &Query) -> Result<QueryResult, TransportError>;
}
