//! Credential lookup for the HTTP transport

use async_trait::async_trait;

/// User name and password for basic authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Source of credentials per host.
///
/// `reauthenticate` is asked once after the repository rejected the current
/// credentials; returning `None` gives up and surfaces the 401.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, host: &str) -> Option<Credentials>;

    async fn reauthenticate(&self, host: &str) -> Option<Credentials>;
}

/// Fixed credentials, never refreshed
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Option<Credentials>,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Some(Credentials::new(username, password)),
        }
    }

    /// Anonymous access
    pub fn none() -> Self {
        Self { credentials: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self, _host: &str) -> Option<Credentials> {
        self.credentials.clone()
    }

    async fn reauthenticate(&self, _host: &str) -> Option<Credentials> {
        None
    }
}
