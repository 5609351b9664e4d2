//! JcrSync Core Library
//!
//! Synchronization between a remote JCR-style content repository and local
//! content files:
//! - Value Codec for the textual property value format
//! - Property Tree model and lazily parsed remote node snapshots
//! - XML Content Codec for `.content.xml` files
//! - Diff-based property writer (minimal field mutations, ordering, deletion)
//! - Repository access façade over a pluggable transport
//! - Local file-system name mapping

pub mod codec;
pub mod content_xml;
pub mod error;
pub mod fs_path;
pub mod namespace;
pub mod node;
pub mod repository;
pub mod transport;
pub mod tree;
pub mod value;
pub mod writer;

pub use content_xml::{CONTENT_FILE, ROOT_ELEMENT, XmlCodec, decode_name, encode_name};
pub use error::{CodecError, JcrError, Result, TransportError, XmlError};
pub use namespace::NamespaceRegistry;
pub use node::RemoteNode;
pub use repository::{FetchMode, JcrRepository, NodeLocation};
pub use transport::{FetchDepth, FileUpload, FormFields, PostResponse, Query, QueryResult, Transport};
pub use tree::{PRIMARY_TYPE, PropertyTree};
pub use value::{PropertyType, Scalar, Timestamp, TypeTag, Value};
pub use writer::{FieldOp, Mutation, PropertyWriter, SaveOptions};
