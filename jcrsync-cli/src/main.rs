//! jcrsync: content synchronization tool for JCR repositories.
//!
//! # Usage
//!
//! ```bash
//! # Write a default config file
//! jcrsync init
//!
//! # Fetch a node as JSON or as a content file
//! jcrsync get /content/site --mode recursive --format xml
//!
//! # Make a remote node match a local content file
//! jcrsync put /content/site/jcr:content .content.xml --delete-absent-properties
//!
//! # Upload a binary
//! jcrsync push-file /content/dam/logo.svg ./logo.svg
//!
//! # Delete, move, query
//! jcrsync rm /content/old
//! jcrsync mv /content/a /content/b
//! jcrsync query --path /content --type cq:Page --property jcr:title=Home
//!
//! # Export a subtree into a local checkout
//! jcrsync export /content/site --dir ./jcr_root
//! ```

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use config::CONFIG_FILE;

#[derive(Parser, Debug)]
#[command(name = "jcrsync")]
#[command(author = "JcrSync Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Synchronize content between a JCR repository and local files")]
struct Cli {
    /// Config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Named host from the config file
    #[arg(long, global = true)]
    host: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// How much of a node `get` returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Normal,
    Property,
    Children,
    Recursive,
    RecursiveChildren,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Xml,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a config file with default settings
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Fetch a node
    Get {
        /// Repository path
        path: String,
        #[arg(short, long, value_enum, default_value = "normal")]
        mode: Mode,
        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Make a remote node match a local `.xml` or `.json` file
    Put {
        /// Repository path
        path: String,
        /// Local content file
        file: PathBuf,
        /// Delete remote properties missing from the file
        #[arg(long)]
        delete_absent_properties: bool,
        /// Delete remote children missing from the file
        #[arg(long)]
        delete_absent_children: bool,
        /// Position of the node among its siblings
        #[arg(long)]
        order: Option<usize>,
    },

    /// Upload a file as a binary node
    #[command(name = "push-file")]
    PushFile {
        /// Repository path of the file node
        path: String,
        /// Local file
        file: PathBuf,
        /// MIME type (guessed from the extension by default)
        #[arg(long)]
        mime_type: Option<String>,
    },

    /// Delete a node
    Rm {
        /// Repository path
        path: String,
    },

    /// Move or rename a node on the same host
    Mv {
        src: String,
        dst: String,
        /// Host of the destination (must equal the source host)
        #[arg(long)]
        dst_host: Option<String>,
    },

    /// Run a QueryBuilder query and print the matching paths
    Query {
        #[arg(long)]
        path: Option<String>,
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long)]
        fulltext: Option<String>,
        /// Property predicate as `name=value`; repeatable
        #[arg(long)]
        property: Vec<String>,
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Write a subtree as `.content.xml` into a local checkout
    Export {
        /// Repository path
        path: String,
        /// Local root the repository path is mapped into
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jcrsync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Commands::Init { force } = cli.command {
        return commands::cmd_init(&cli.config, force);
    }

    let config = config::CliConfig::load(&cli.config)?;
    let ctx = commands::Context::new(&config, cli.host.as_deref())?;

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Get {
            path,
            mode,
            format,
            output,
        } => ctx.cmd_get(&path, mode, format, output.as_deref()).await,

        Commands::Put {
            path,
            file,
            delete_absent_properties,
            delete_absent_children,
            order,
        } => {
            let options = ctx
                .save_options(order)
                .delete_absent_properties(delete_absent_properties)
                .delete_absent_children(delete_absent_children);
            ctx.cmd_put(&path, &file, &options).await
        }

        Commands::PushFile {
            path,
            file,
            mime_type,
        } => ctx.cmd_push_file(&path, &file, mime_type.as_deref()).await,

        Commands::Rm { path } => ctx.cmd_rm(&path).await,

        Commands::Mv { src, dst, dst_host } => {
            let dst_url = match dst_host.as_deref() {
                Some(name) => config.host(Some(name))?.url.trim_end_matches('/').to_string(),
                None => ctx.host_url().to_string(),
            };
            ctx.cmd_mv(&src, &dst_url, &dst).await
        }

        Commands::Query {
            path,
            node_type,
            fulltext,
            property,
            limit,
        } => {
            let query = commands::build_query(
                path.as_deref(),
                node_type.as_deref(),
                fulltext.as_deref(),
                &property,
                limit,
            )?;
            ctx.cmd_query(&query).await
        }

        Commands::Export { path, dir } => ctx.cmd_export(&path, &dir).await,
    }
}
