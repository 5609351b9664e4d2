//! Subcommand implementations

use anyhow::{Context as _, Result, anyhow};
use bytes::Bytes;
use jcrsync_core::content_xml::{read_content_file, write_content_file};
use jcrsync_core::fs_path::to_platform_path;
use jcrsync_core::{
    CONTENT_FILE, FetchMode, JcrRepository, NodeLocation, PropertyTree, Query, SaveOptions, XmlCodec,
};
use jcrsync_http::{HttpTransport, StaticCredentials};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::{CONFIG_FILE, CliConfig};
use crate::{Format, Mode};

impl From<Mode> for FetchMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => FetchMode::Normal,
            Mode::Property => FetchMode::Property,
            Mode::Children => FetchMode::Children,
            Mode::Recursive => FetchMode::Recursive,
            Mode::RecursiveChildren => FetchMode::RecursiveChildren,
        }
    }
}

pub fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!("{:?} already exists (use --force to overwrite)", path));
    }
    CliConfig::default().save(path)?;
    println!("Wrote {}", path.display());
    if path.file_name().and_then(|n| n.to_str()) != Some(CONFIG_FILE) {
        println!("Pass --config {} to use it", path.display());
    }
    Ok(())
}

/// Repository connection plus the settings shared by all commands
pub struct Context {
    repo: JcrRepository<HttpTransport>,
    codec: XmlCodec,
    ignored_properties: Vec<String>,
}

impl Context {
    pub fn new(config: &CliConfig, host: Option<&str>) -> Result<Self> {
        let host = config.host(host)?;
        tracing::debug!("Using host {} ({})", host.name, host.url);
        let credentials = Arc::new(StaticCredentials::new(&host.username, &host.password));
        let transport = HttpTransport::new(&host.url, credentials, host.timeout())
            .with_context(|| format!("Failed to set up connection to {}", host.url))?;
        Ok(Self {
            repo: JcrRepository::new(transport),
            codec: XmlCodec::default(),
            ignored_properties: config.ignored_properties.clone(),
        })
    }

    pub fn host_url(&self) -> &str {
        self.repo.host()
    }

    pub fn save_options(&self, order: Option<usize>) -> SaveOptions {
        let mut options = self
            .ignored_properties
            .iter()
            .fold(SaveOptions::new(), |opts, name| opts.ignore(name.as_str()));
        options.order = order;
        options
    }

    pub async fn cmd_get(
        &self,
        path: &str,
        mode: Mode,
        format: Format,
        output: Option<&Path>,
    ) -> Result<()> {
        let tree = self.repo.fetch_node(path, mode.into()).await?;
        let rendered = match format {
            Format::Json => serde_json::to_string_pretty(&tree.to_json())?,
            Format::Xml => self.codec.encode(jcrsync_core::ROOT_ELEMENT, &tree)?,
        };
        match output {
            Some(file) => {
                fs::write(file, rendered).with_context(|| format!("Failed to write {:?}", file))?;
                println!("Wrote {}", file.display());
            }
            None => println!("{}", rendered.trim_end()),
        }
        Ok(())
    }

    pub async fn cmd_put(&self, path: &str, file: &Path, options: &SaveOptions) -> Result<()> {
        let tree = load_tree(&self.codec, file)?;
        let changed = self.repo.save_properties(path, &tree, options).await?;
        if changed.is_empty() {
            println!("{} is up to date", path);
        } else {
            for p in &changed {
                println!("  M {}", p);
            }
            println!("Saved {} ({} changes)", path, changed.len());
        }
        Ok(())
    }

    pub async fn cmd_push_file(&self, path: &str, file: &Path, mime_type: Option<&str>) -> Result<()> {
        let content = fs::read(file).with_context(|| format!("Failed to read {:?}", file))?;
        let mime_type = mime_type.unwrap_or_else(|| guess_mime_type(file));
        let changed = self
            .repo
            .save_file(path, Bytes::from(content), mime_type)
            .await?;
        println!("Uploaded {} ({} changes)", path, changed.len());
        Ok(())
    }

    pub async fn cmd_rm(&self, path: &str) -> Result<()> {
        self.repo.delete_node(path).await?;
        println!("Deleted {}", path);
        Ok(())
    }

    pub async fn cmd_mv(&self, src: &str, dst_host: &str, dst: &str) -> Result<()> {
        let src = NodeLocation::new(self.host_url(), src);
        let dst = NodeLocation::new(dst_host, dst);
        self.repo.move_node(&src, &dst).await?;
        println!("Moved {} to {}", src.path, dst.path);
        Ok(())
    }

    pub async fn cmd_query(&self, query: &Query) -> Result<()> {
        let result = self.repo.query(query).await?;
        for path in result.paths() {
            println!("{}", path);
        }
        println!("{} hits", result.total);
        Ok(())
    }

    pub async fn cmd_export(&self, path: &str, dir: &Path) -> Result<()> {
        let tree = self.repo.fetch_node(path, FetchMode::Recursive).await?;
        let target = to_platform_path(dir, path).join(CONTENT_FILE);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        write_content_file(&self.codec, &target, &tree)?;
        println!("Exported {} to {}", path, target.display());
        Ok(())
    }
}

/// Read a desired tree from a content file (`.xml`) or a JSON rendering
pub fn load_tree(codec: &XmlCodec, file: &Path) -> Result<PropertyTree> {
    match file.extension().and_then(|e| e.to_str()) {
        Some("json") => {
            let data = fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
            let json: serde_json::Value =
                serde_json::from_str(&data).with_context(|| format!("Failed to parse {:?}", file))?;
            let map = json
                .as_object()
                .ok_or_else(|| anyhow!("{:?} must contain a JSON object", file))?;
            Ok(PropertyTree::from_json(map))
        }
        Some("xml") => Ok(read_content_file(codec, file)?),
        _ => Err(anyhow!("Unsupported content file {:?} (expected .xml or .json)", file)),
    }
}

pub fn build_query(
    path: Option<&str>,
    node_type: Option<&str>,
    fulltext: Option<&str>,
    properties: &[String],
    limit: Option<i64>,
) -> Result<Query> {
    let mut query = Query::new();
    if let Some(path) = path {
        query = query.path(path);
    }
    if let Some(node_type) = node_type {
        query = query.node_type(node_type);
    }
    if let Some(text) = fulltext {
        query = query.fulltext(text);
    }
    for property in properties {
        let (name, value) = property
            .split_once('=')
            .ok_or_else(|| anyhow!("Property predicate '{}' must be name=value", property))?;
        query = query.property(name, value);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    if query.predicates().is_empty() {
        return Err(anyhow!("Query needs at least one predicate"));
    }
    Ok(query)
}

pub fn guess_mime_type(file: &Path) -> &'static str {
    let ext = file
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_tree_from_json_and_xml() {
        let dir = TempDir::new().unwrap();
        let codec = XmlCodec::default();

        let json = dir.path().join("node.json");
        fs::write(&json, r#"{"jcr:primaryType":"nt:unstructured","count":3,"child":{"a":"b"}}"#).unwrap();
        let tree = load_tree(&codec, &json).unwrap();
        assert_eq!(tree.primary_type(), Some("nt:unstructured"));
        assert_eq!(tree.child_names(), vec!["child"]);

        let xml = dir.path().join(CONTENT_FILE);
        fs::write(
            &xml,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<jcr:root xmlns:jcr="http://www.jcp.org/jcr/1.0" jcr:primaryType="nt:unstructured" title="Hello"/>
"#,
        )
        .unwrap();
        let tree = load_tree(&codec, &xml).unwrap();
        assert_eq!(tree.get("title").and_then(|v| v.as_str()), Some("Hello"));

        assert!(load_tree(&codec, &dir.path().join("node.txt")).is_err());
    }

    #[test]
    fn test_build_query() {
        let query = build_query(
            Some("/content"),
            Some("cq:Page"),
            None,
            &["jcr:title=Home".to_string()],
            Some(5),
        )
        .unwrap();
        let preds = query.predicates();
        assert_eq!(preds[0], ("path".to_string(), "/content".to_string()));
        assert!(preds.contains(&("1_property.value".to_string(), "Home".to_string())));

        assert!(build_query(None, None, None, &["broken".to_string()], None).is_err());
        assert!(build_query(None, None, None, &[], None).is_err());
    }

    #[test]
    fn test_guess_mime_type() {
        assert_eq!(guess_mime_type(Path::new("logo.SVG")), "image/svg+xml");
        assert_eq!(guess_mime_type(Path::new("a/b.pdf")), "application/pdf");
        assert_eq!(guess_mime_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_save_options_carry_ignored_properties() {
        let mut config = CliConfig::default();
        config.ignored_properties = vec!["secret".to_string()];
        let ctx = Context::new(&config, None).unwrap();

        let options = ctx.save_options(Some(2));
        assert!(options.ignored_properties.contains("secret"));
        assert_eq!(options.order, Some(2));
        assert_eq!(ctx.host_url(), "http://localhost:4502");
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        cmd_init(&path, false).unwrap();
        assert!(cmd_init(&path, false).is_err());
        cmd_init(&path, true).unwrap();
        assert_eq!(CliConfig::load(&path).unwrap(), CliConfig::default());
    }
}
