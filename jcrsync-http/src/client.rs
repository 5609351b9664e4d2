//! Sling HTTP transport
//!
//! - `GET {path}.{depth}.json` for node fetches
//! - form-encoded `POST {path}` for property writes, deletes and moves
//! - multipart `POST {parent}` for file uploads
//! - `GET /bin/querybuilder.json` for queries
//!
//! Every request carries basic authentication from the configured
//! [`CredentialProvider`]. A 401 triggers one retry with refreshed
//! credentials; a second 401 is returned to the caller.

use async_trait::async_trait;
use bytes::Bytes;
use jcrsync_core::{
    FetchDepth, FileUpload, FormFields, PostResponse, Query, QueryResult, Transport, TransportError,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{CredentialProvider, Credentials};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// QueryBuilder servlet
pub const QUERY_ENDPOINT: &str = "/bin/querybuilder.json";

/// [`Transport`] talking to a Sling-based repository over HTTP
pub struct HttpTransport {
    host: String,
    http: Client,
    credentials: Arc<dyn CredentialProvider>,
}

impl HttpTransport {
    /// Create a transport for `host` (e.g. `http://localhost:4502`)
    pub fn new(
        host: &str,
        credentials: Arc<dyn CredentialProvider>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            http,
            credentials,
        })
    }

    /// URL of a node's JSON rendering at the given depth
    pub fn node_url(&self, path: &str, depth: FetchDepth) -> Result<Url, TransportError> {
        self.url(path, &format!(".{}.json", depth.selector()))
    }

    /// URL a form is posted to
    pub fn post_url(&self, path: &str) -> Result<Url, TransportError> {
        self.url(path, "")
    }

    /// Join a repository path onto the host, percent-encoding each name and
    /// appending `suffix` to the last one
    fn url(&self, path: &str, suffix: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(&self.host)
            .map_err(|e| TransportError::Network(format!("Invalid host {}: {}", self.host, e)))?;
        let mut names: Vec<&str> = path.split('/').filter(|n| !n.is_empty()).collect();
        let last = format!("{}{}", names.pop().unwrap_or_default(), suffix);
        url.path_segments_mut()
            .map_err(|_| TransportError::Network(format!("Invalid host {}", self.host)))?
            .pop_if_empty()
            .extend(names)
            .push(&last);
        Ok(url)
    }

    /// Send the request built by `build`, retrying once after a 401 if the
    /// credential provider hands out new credentials
    async fn send<F>(&self, build: F) -> Result<Response, TransportError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let credentials = self.credentials.credentials(&self.host).await;
        let response = execute(build(&self.http), credentials.as_ref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response).await;
        }

        tracing::warn!("Authentication rejected by {}, retrying", self.host);
        match self.credentials.reauthenticate(&self.host).await {
            Some(refreshed) => {
                let response = execute(build(&self.http), Some(&refreshed)).await?;
                check_status(response).await
            }
            None => check_status(response).await,
        }
    }
}

async fn execute(
    request: RequestBuilder,
    credentials: Option<&Credentials>,
) -> Result<Response, TransportError> {
    let request = match credentials {
        Some(c) => request.basic_auth(&c.username, Some(&c.password)),
        None => request,
    };
    request
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))
}

async fn check_status(response: Response) -> Result<Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TransportError::from_status(status.as_u16(), body))
}

async fn read_body(response: Response) -> Result<String, TransportError> {
    response
        .text()
        .await
        .map_err(|e| TransportError::Network(e.to_string()))
}

/// One entry of the Sling POST servlet's change log
#[derive(Debug, Deserialize)]
struct Change {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    argument: JsonValue,
}

#[derive(Debug, Deserialize)]
struct SlingPostResponse {
    #[serde(default)]
    changes: Vec<Change>,
}

/// Extract the changed paths from a Sling POST response body
pub fn parse_post_response(body: &str) -> Result<PostResponse, TransportError> {
    if body.trim().is_empty() {
        return Ok(PostResponse::default());
    }
    let parsed: SlingPostResponse = serde_json::from_str(body)
        .map_err(|e| TransportError::Decode(format!("POST response: {}", e)))?;

    let mut changes = Vec::new();
    for change in parsed.changes {
        let paths: Vec<&str> = match &change.argument {
            JsonValue::String(path) => vec![path.as_str()],
            // moves and copies report [source, destination]
            JsonValue::Array(items) => items.iter().filter_map(JsonValue::as_str).collect(),
            _ => Vec::new(),
        };
        tracing::trace!("{} {:?}", change.kind, paths);
        for path in paths {
            if !changes.iter().any(|p| p == path) {
                changes.push(path.to_string());
            }
        }
    }
    Ok(PostResponse { changes })
}

fn file_part(name: &str, content: Bytes, mime_type: &str) -> Result<Part, TransportError> {
    Part::bytes(content.to_vec())
        .file_name(name.to_string())
        .mime_str(mime_type)
        .map_err(|e| TransportError::Decode(format!("Invalid MIME type {}: {}", mime_type, e)))
}

#[async_trait]
impl Transport for HttpTransport {
    fn host(&self) -> &str {
        &self.host
    }

    async fn fetch_json(
        &self,
        path: &str,
        depth: FetchDepth,
    ) -> Result<Map<String, JsonValue>, TransportError> {
        let url = self.node_url(path, depth)?;
        tracing::debug!("GET {}", url);
        let response = self.send(|http| http.get(url.clone())).await?;
        let body = read_body(response).await?;
        match serde_json::from_str(&body) {
            Ok(JsonValue::Object(map)) => Ok(map),
            Ok(_) => Err(TransportError::Decode(format!("{} is not a JSON object", url))),
            Err(e) => Err(TransportError::Decode(format!("{}: {}", url, e))),
        }
    }

    async fn post(&self, path: &str, fields: &FormFields) -> Result<PostResponse, TransportError> {
        let url = self.post_url(path)?;
        let pairs: Vec<(&str, &str)> = fields.iter().collect();
        tracing::debug!("POST {} ({} fields)", url, pairs.len());
        let response = self.send(|http| http.post(url.clone()).form(&pairs)).await?;
        parse_post_response(&read_body(response).await?)
    }

    async fn upload(&self, parent: &str, file: FileUpload) -> Result<PostResponse, TransportError> {
        let url = self.post_url(parent)?;
        tracing::debug!("POST {} (upload {}, {} bytes)", url, file.name, file.content.len());
        // validate once so the retry closure cannot fail
        file_part(&file.name, file.content.clone(), &file.mime_type)?;
        let response = self
            .send(|http| {
                let form = match file_part(&file.name, file.content.clone(), &file.mime_type) {
                    Ok(part) => Form::new().part(file.name.clone(), part),
                    Err(_) => Form::new(),
                };
                http.post(url.clone()).multipart(form)
            })
            .await?;
        parse_post_response(&read_body(response).await?)
    }

    async fn query(&self, query: &Query) -> Result<QueryResult, TransportError> {
        let url = format!("{}{}", self.host, QUERY_ENDPOINT);
        tracing::debug!("GET {} {:?}", url, query.predicates());
        let response = self
            .send(|http| http.get(&url).query(query.predicates()))
            .await?;
        let body = read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(format!("query result: {}", e)))
    }
}
