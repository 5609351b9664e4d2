//! In-memory transport used by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use jcrsync_core::{
    FetchDepth, FileUpload, FormFields, PostResponse, Query, QueryResult, Transport, TransportError,
};
use serde_json::{Map, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub const HOST: &str = "http://localhost:4502";

/// Serves canned JSON for fetches and records every request
#[derive(Default)]
pub struct MemoryTransport {
    nodes: HashMap<String, Map<String, JsonValue>>,
    failing_fetches: HashMap<String, (u16, String)>,
    failing_posts: HashSet<String>,
    pub fetches: Mutex<Vec<(String, FetchDepth)>>,
    pub posts: Mutex<Vec<(String, FormFields)>>,
    pub uploads: Mutex<Vec<(String, FileUpload)>>,
    pub queries: Mutex<Vec<Query>>,
    pub register_uploads: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            register_uploads: true,
            ..Self::default()
        }
    }

    pub fn with_node(mut self, path: &str, json: JsonValue) -> Self {
        let map = json.as_object().cloned().expect("node JSON must be an object");
        self.nodes.insert(path.to_string(), map);
        self
    }

    pub fn failing_fetch(mut self, path: &str, status: u16, body: &str) -> Self {
        self.failing_fetches
            .insert(path.to_string(), (status, body.to_string()));
        self
    }

    pub fn failing_post(mut self, path: &str) -> Self {
        self.failing_posts.insert(path.to_string());
        self
    }

    pub fn posts(&self) -> Vec<(String, FormFields)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn post_paths(&self) -> Vec<String> {
        self.posts().into_iter().map(|(p, _)| p).collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn host(&self) -> &str {
        HOST
    }

    async fn fetch_json(
        &self,
        path: &str,
        depth: FetchDepth,
    ) -> Result<Map<String, JsonValue>, TransportError> {
        self.fetches.lock().unwrap().push((path.to_string(), depth));
        if let Some((status, body)) = self.failing_fetches.get(path) {
            return Err(TransportError::from_status(*status, body.clone()));
        }
        self.nodes
            .get(path)
            .cloned()
            .ok_or_else(|| TransportError::from_status(404, String::new()))
    }

    async fn post(&self, path: &str, fields: &FormFields) -> Result<PostResponse, TransportError> {
        self.posts
            .lock()
            .unwrap()
            .push((path.to_string(), fields.clone()));
        if self.failing_posts.contains(path) {
            return Err(TransportError::from_status(
                500,
                r#"{"error":{"message":"Constraint violation"}}"#.to_string(),
            ));
        }
        Ok(PostResponse {
            changes: vec![path.to_string()],
        })
    }

    async fn upload(&self, parent: &str, file: FileUpload) -> Result<PostResponse, TransportError> {
        let path = format!("{}/{}", parent.trim_end_matches('/'), file.name);
        self.uploads.lock().unwrap().push((parent.to_string(), file));
        Ok(PostResponse {
            changes: if self.register_uploads { vec![path] } else { vec![] },
        })
    }

    async fn query(&self, query: &Query) -> Result<QueryResult, TransportError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(QueryResult {
            success: true,
            total: 1,
            hits: vec![serde_json::json!({ "path": "/content/hit" })],
        })
    }
}
