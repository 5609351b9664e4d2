//! Configuration stored in `jcrsync.json`

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "jcrsync.json";

/// A repository the tool can talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl HostConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            url: "http://localhost:4502".to_string(),
            username: default_username(),
            password: default_password(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_username() -> String {
    "admin".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_hosts() -> Vec<HostConfig> {
    vec![HostConfig::default()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default = "default_hosts")]
    pub hosts: Vec<HostConfig>,
    /// Host used when none is named; the first host otherwise
    #[serde(default)]
    pub default_host: Option<String>,
    /// Properties never written on `put`
    #[serde(default)]
    pub ignored_properties: Vec<String>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            hosts: default_hosts(),
            default_host: None,
            ignored_properties: Vec::new(),
        }
    }
}

impl CliConfig {
    /// Load the config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: CliConfig = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        if config.hosts.is_empty() {
            return Err(anyhow!("Config {:?} declares no hosts", path));
        }
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, serde_json::to_string_pretty(self)?)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Host by name, or the default host when `name` is `None`
    pub fn host(&self, name: Option<&str>) -> Result<&HostConfig> {
        let wanted = name.or(self.default_host.as_deref());
        match wanted {
            Some(wanted) => self
                .hosts
                .iter()
                .find(|h| h.name == wanted)
                .ok_or_else(|| anyhow!("Unknown host '{}'", wanted)),
            None => self
                .hosts
                .first()
                .ok_or_else(|| anyhow!("No hosts configured")),
        }
    }
}
