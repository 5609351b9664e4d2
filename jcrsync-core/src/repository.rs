//! Repository Access Façade
//!
//! Fetch, save, delete, move and query operations over a remote repository.
//! Property saves go through the [`PropertyWriter`]; binaries are always
//! uploaded whole.

use bytes::Bytes;

use crate::content_xml::{ROOT_ELEMENT, XmlCodec};
use crate::error::{JcrError, Result, TransportError};
use crate::transport::{DIFF_KEY, FetchDepth, FileUpload, FormFields, Query, QueryResult, Transport};
use crate::tree::PropertyTree;
use crate::value::Value;
use crate::writer::{PropertyWriter, SaveOptions};

/// How much of a node a fetch returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Properties plus immediate children with their own properties
    Normal,
    /// Properties only
    Property,
    /// Properties plus immediate children as empty placeholders
    Children,
    /// The whole subtree
    Recursive,
    /// The whole subtree without the node's own properties
    RecursiveChildren,
}

impl FetchMode {
    fn depth(self) -> FetchDepth {
        match self {
            FetchMode::Property => FetchDepth::Properties,
            FetchMode::Normal | FetchMode::Children => FetchDepth::Shallow,
            FetchMode::Recursive | FetchMode::RecursiveChildren => FetchDepth::Infinity,
        }
    }

    /// Trim a fetched tree to what the mode promises
    fn filter(self, tree: PropertyTree) -> PropertyTree {
        match self {
            FetchMode::Normal => tree
                .iter()
                .map(|(k, v)| match v {
                    Value::Node(child) => (k.to_string(), Value::Node(child.without_children())),
                    other => (k.to_string(), other.clone()),
                })
                .collect(),
            FetchMode::Property => tree.without_children(),
            FetchMode::Children => tree.with_placeholder_children(),
            FetchMode::Recursive => tree,
            FetchMode::RecursiveChildren => tree.only_children(),
        }
    }
}

/// A node addressed on a specific host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLocation {
    pub host: String,
    pub path: String,
}

impl NodeLocation {
    pub fn new(host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }
}

/// Split `/a/b/c` into (`/a/b`, `c`)
pub fn split_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/')?;
    if name.is_empty() {
        return None;
    }
    Some((if parent.is_empty() { "/" } else { parent }, name))
}

/// Remote repository operations bound to one transport
pub struct JcrRepository<T: Transport> {
    transport: T,
}

impl<T: Transport> JcrRepository<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn host(&self) -> &str {
        self.transport.host()
    }

    pub async fn fetch_node(&self, path: &str, mode: FetchMode) -> Result<PropertyTree> {
        tracing::debug!("Fetching {} ({:?})", path, mode);
        let json = self
            .transport
            .fetch_json(path, mode.depth())
            .await
            .map_err(|e| log_failure(path, "fetch node", e))?;
        Ok(mode.filter(PropertyTree::from_json(&json)))
    }

    pub async fn fetch_properties(&self, path: &str) -> Result<PropertyTree> {
        self.fetch_node(path, FetchMode::Property).await
    }

    /// Immediate children as placeholders, without the node's own properties
    pub async fn fetch_child_nodes(&self, path: &str) -> Result<PropertyTree> {
        Ok(self.fetch_node(path, FetchMode::Children).await?.only_children())
    }

    /// Reconcile the node at `path` with `tree`
    pub async fn save_properties(
        &self,
        path: &str,
        tree: &PropertyTree,
        options: &SaveOptions,
    ) -> Result<Vec<String>> {
        PropertyWriter::new(&self.transport)
            .reconcile(path, tree, options)
            .await
    }

    /// Upload `content` as the file node at `path`, replacing any existing one
    pub async fn save_file(&self, path: &str, content: Bytes, mime_type: &str) -> Result<Vec<String>> {
        let (parent, name) = split_path(path)
            .ok_or_else(|| JcrError::operation(path, "Cannot upload to the repository root"))?;
        tracing::debug!("Uploading {} ({} bytes, {})", path, content.len(), mime_type);

        let upload = FileUpload {
            name: name.to_string(),
            content,
            mime_type: mime_type.to_string(),
        };
        let response = self
            .transport
            .upload(parent, upload)
            .await
            .map_err(|e| log_failure(path, "upload file", e))?;
        if response.changes.is_empty() {
            let err = JcrError::operation(path, "File upload was not registered by the repository");
            tracing::error!("{}", err);
            return Err(err);
        }
        tracing::info!("Uploaded {}", path);
        Ok(response.changes)
    }

    pub async fn delete_node(&self, path: &str) -> Result<Vec<String>> {
        tracing::debug!("Deleting {}", path);
        let response = self
            .transport
            .post(path, &FormFields::delete_node())
            .await
            .map_err(|e| log_failure(path, "delete node", e))?;
        tracing::info!("Deleted {}", path);
        Ok(response.changes)
    }

    /// Move or rename a node; both locations must be on this host
    pub async fn move_node(&self, src: &NodeLocation, dst: &NodeLocation) -> Result<Vec<String>> {
        if src.host != dst.host || src.host != self.host() {
            let err = JcrError::CrossHostMove {
                src: format!("{}{}", src.host, src.path),
                dst: format!("{}{}", dst.host, dst.path),
            };
            tracing::error!("{}", err);
            return Err(err);
        }

        tracing::debug!("Moving {} to {}", src.path, dst.path);
        let fields = FormFields::new().with(DIFF_KEY, format!(">{} : {}", src.path, dst.path));
        let response = self
            .transport
            .post("/", &fields)
            .await
            .map_err(|e| log_failure(&src.path, "move node", e))?;
        if response.changes.is_empty() {
            let err = JcrError::operation(&src.path, format!("Move to {} had no effect", dst.path));
            tracing::error!("{}", err);
            return Err(err);
        }
        tracing::info!("Moved {} to {}", src.path, dst.path);
        Ok(response.changes)
    }

    pub async fn query(&self, query: &Query) -> Result<QueryResult> {
        tracing::debug!("Query {:?}", query.predicates());
        self.transport
            .query(query)
            .await
            .map_err(|e| log_failure("/", "run query", e))
    }

    /// Render the subtree at `path` as a content file
    pub async fn export_content(&self, path: &str, codec: &XmlCodec) -> Result<String> {
        let tree = self.fetch_node(path, FetchMode::Recursive).await?;
        Ok(codec.encode(ROOT_ELEMENT, &tree)?)
    }
}

fn log_failure(path: &str, action: &str, err: TransportError) -> JcrError {
    let err = JcrError::wrap(path, action, err);
    tracing::error!("{}", err);
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("/content/dam/a.png"), Some(("/content/dam", "a.png")));
        assert_eq!(split_path("/a"), Some(("/", "a")));
        assert_eq!(split_path("/a/"), Some(("/", "a")));
        assert_eq!(split_path("/"), None);
        assert_eq!(split_path("relative"), None);
    }

    #[test]
    fn test_fetch_mode_filters() {
        let tree = PropertyTree::new()
            .with("title", "t")
            .with(
                "child",
                PropertyTree::new()
                    .with("x", "1")
                    .with("grand", PropertyTree::new().with("y", "2")),
            );

        let normal = FetchMode::Normal.filter(tree.clone());
        let child = normal.get("child").and_then(Value::as_node).unwrap();
        assert!(child.contains_key("x"));
        assert!(!child.contains_key("grand"));

        let props = FetchMode::Property.filter(tree.clone());
        assert_eq!(props.keys().collect::<Vec<_>>(), vec!["title"]);

        let children = FetchMode::Children.filter(tree.clone());
        assert_eq!(children.get("child"), Some(&Value::Node(PropertyTree::new())));
        assert!(children.contains_key("title"));

        assert_eq!(FetchMode::Recursive.filter(tree.clone()), tree);

        let rc = FetchMode::RecursiveChildren.filter(tree.clone());
        assert!(!rc.contains_key("title"));
        assert!(rc.get("child").and_then(Value::as_node).unwrap().contains_key("grand"));
    }
}
