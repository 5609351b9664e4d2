//! XML Content Codec
//!
//! Maps a [`PropertyTree`] to and from the document-view XML used for
//! `.content.xml` files: properties become attributes (encoded with the value
//! codec), child nodes become nested elements.

use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::writer::Writer;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::Path;

use crate::codec;
use crate::error::XmlError;
use crate::namespace::NamespaceRegistry;
use crate::tree::{PropertyTree, is_internal_property, is_meta_key};
use crate::value::Value;

/// Name of the root element of a content file
pub const ROOT_ELEMENT: &str = "jcr:root";

/// Conventional file name of a node's content file
pub const CONTENT_FILE: &str = ".content.xml";

lazy_static::lazy_static! {
    static ref ESCAPED_CHAR: Regex = Regex::new(r"_x([0-9a-fA-F]{4,6})_").unwrap();
}

/// Escape a JCR name so that it is a valid XML element/attribute name.
///
/// The namespace colon is kept; everything else outside `[A-Za-z0-9_.-]`, and
/// a leading digit, hyphen or dot, becomes `_xHHHH_`. A literal `_x` followed
/// by a hex digit has its underscore escaped as `_x005f_`.
pub fn encode_name(name: &str) -> String {
    match name.split_once(':') {
        Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
            format!("{}:{}", escape_part(prefix), escape_part(local))
        }
        _ => escape_part(name),
    }
}

/// Inverse of [`encode_name`]
pub fn decode_name(name: &str) -> String {
    ESCAPED_CHAR
        .replace_all(name, |caps: &Captures| {
            u32::from_str_radix(&caps[1], 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

fn escape_part(part: &str) -> String {
    let chars: Vec<char> = part.chars().collect();
    let mut out = String::with_capacity(part.len());
    for (i, &c) in chars.iter().enumerate() {
        let looks_escaped = c == '_'
            && chars.get(i + 1) == Some(&'x')
            && chars.get(i + 2).is_some_and(|h| h.is_ascii_hexdigit());
        let allowed = if i == 0 {
            c.is_ascii_alphabetic() || c == '_'
        } else {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
        };
        if allowed && !looks_escaped {
            out.push(c);
        } else {
            out.push_str(&format!("_x{:04x}_", c as u32));
        }
    }
    out
}

/// Encoder/decoder for content files
#[derive(Debug, Clone, Default)]
pub struct XmlCodec {
    namespaces: NamespaceRegistry,
}

impl XmlCodec {
    pub fn new(namespaces: NamespaceRegistry) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    /// Render `tree` as a document whose root element is `name`
    pub fn encode(&self, name: &str, tree: &PropertyTree) -> Result<String, XmlError> {
        let mut prefixes = BTreeSet::new();
        self.collect_prefixes(name, tree, &mut prefixes);

        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 4);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(ser)?;

        let declarations: Vec<(String, String)> = prefixes
            .iter()
            .filter_map(|p| {
                self.namespaces
                    .uri(p)
                    .map(|uri| (format!("xmlns:{}", p), uri.to_string()))
            })
            .collect();
        write_node(&mut writer, name, tree, &declarations)?;

        let mut xml = String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| XmlError::Serialization(e.to_string()))?;
        xml.push('\n');
        Ok(xml)
    }

    /// Parse a content file into its root tree
    pub fn decode(&self, xml: &str) -> Result<PropertyTree, XmlError> {
        self.decode_document(xml).map(|(_, tree)| tree)
    }

    /// Parse a content file, returning the decoded root element name as well
    pub fn decode_document(&self, xml: &str) -> Result<(String, PropertyTree), XmlError> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<(String, PropertyTree)> = Vec::new();
        let mut root: Option<(String, PropertyTree)> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(ref e)) => {
                    let name = element_name(e)?;
                    stack.push((name, read_attributes(e)?));
                }
                Ok(Event::Empty(ref e)) => {
                    let node = (element_name(e)?, read_attributes(e)?);
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::End(_)) => {
                    let node = stack.pop().ok_or_else(|| {
                        XmlError::InvalidStructure("unbalanced closing tag".to_string())
                    })?;
                    attach(&mut stack, &mut root, node)?;
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(XmlError::Parse(e.to_string())),
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(XmlError::InvalidStructure("unclosed element".to_string()));
        }
        root.ok_or_else(|| XmlError::InvalidStructure("document has no root element".to_string()))
    }

    fn collect_prefixes(&self, name: &str, tree: &PropertyTree, found: &mut BTreeSet<String>) {
        let mut note = |text: &str| {
            if let Some(p) = self.namespaces.prefix_of(text) {
                found.insert(p.to_string());
            }
        };
        note(name);
        for (key, value) in tree.properties() {
            if is_internal_property(key) {
                continue;
            }
            note(key);
            match value {
                Value::Scalar(s) => {
                    if let Some(text) = s.as_str() {
                        note(text);
                    }
                }
                Value::Array(items) => items.iter().filter_map(|s| s.as_str()).for_each(&mut note),
                Value::Node(_) => {}
            }
        }
        for (child, subtree) in tree.children() {
            self.collect_prefixes(child, subtree, found);
        }
    }
}

fn write_node(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    tree: &PropertyTree,
    declarations: &[(String, String)],
) -> Result<(), XmlError> {
    let element = xml_name(name)?;
    if let Some((key, _)) = tree.iter().find(|(k, v)| is_meta_key(k) && v.is_node()) {
        return Err(XmlError::InvalidStructure(format!(
            "structured metadata '{}' under '{}' cannot be written as XML",
            key, name
        )));
    }
    let mut start = BytesStart::new(element.as_str());
    for (key, uri) in declarations {
        start.push_attribute(raw_attribute(key, uri));
    }
    for (key, value) in tree.properties() {
        if is_internal_property(key) {
            continue;
        }
        let text = codec::serialize_typed(value, tree.type_hint(key)).map_err(|source| {
            XmlError::Value {
                attribute: key.to_string(),
                source,
            }
        })?;
        start.push_attribute(raw_attribute(&xml_name(key)?, &text));
    }

    let children: Vec<(&str, &PropertyTree)> = tree.children().collect();
    if children.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(ser)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(ser)?;
    for (child, subtree) in children {
        write_node(writer, child, subtree, &[])?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.as_str())))
        .map_err(ser)?;
    Ok(())
}

/// Escaped element or attribute name; the empty name has no XML form
fn xml_name(name: &str) -> Result<String, XmlError> {
    if name.is_empty() {
        return Err(XmlError::InvalidStructure("empty name".to_string()));
    }
    Ok(encode_name(name))
}

/// Attribute with entity-encoded value; whitespace control characters are
/// written as character references so they survive attribute normalization.
fn raw_attribute<'a>(key: &'a str, value: &str) -> Attribute<'a> {
    let escaped = quick_xml::escape::escape(value)
        .replace('\n', "&#xA;")
        .replace('\r', "&#xD;")
        .replace('\t', "&#x9;");
    Attribute {
        key: QName(key.as_bytes()),
        value: Cow::Owned(escaped.into_bytes()),
    }
}

fn ser<E: std::fmt::Display>(e: E) -> XmlError {
    XmlError::Serialization(e.to_string())
}

fn element_name(e: &BytesStart<'_>) -> Result<String, XmlError> {
    let raw = std::str::from_utf8(e.name().as_ref())
        .map_err(|err| XmlError::Parse(err.to_string()))?
        .to_string();
    Ok(decode_name(&raw))
}

fn read_attributes(e: &BytesStart<'_>) -> Result<PropertyTree, XmlError> {
    let mut tree = PropertyTree::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Parse(err.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())
            .map_err(|err| XmlError::Parse(err.to_string()))?;
        if key == "xmlns" || key.starts_with("xmlns:") {
            continue;
        }
        let raw = attr
            .unescape_value()
            .map_err(|err| XmlError::Parse(err.to_string()))?;
        let name = decode_name(key);
        let decoded = codec::deserialize(&raw, None).map_err(|source| XmlError::Value {
            attribute: name.clone(),
            source,
        })?;
        if decoded.explicit {
            tree.set_type_hint(&name, decoded.property_type);
        }
        tree.insert(name, decoded.value);
    }
    Ok(tree)
}

fn attach(
    stack: &mut [(String, PropertyTree)],
    root: &mut Option<(String, PropertyTree)>,
    node: (String, PropertyTree),
) -> Result<(), XmlError> {
    let (name, tree) = node;
    match stack.last_mut() {
        Some((parent_name, parent)) => {
            if parent.contains_key(&name) {
                return Err(XmlError::DuplicateSibling {
                    parent: parent_name.clone(),
                    name,
                });
            }
            parent.insert(name, Value::Node(tree));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some((name, tree));
            Ok(())
        }
        None => Err(XmlError::InvalidStructure(
            "document has more than one root element".to_string(),
        )),
    }
}

/// Read and decode a content file from disk
pub fn read_content_file(codec: &XmlCodec, path: &Path) -> Result<PropertyTree, XmlError> {
    let xml = std::fs::read_to_string(path)?;
    codec.decode(&xml)
}

/// Encode `tree` and write it to disk as a content file
pub fn write_content_file(codec: &XmlCodec, path: &Path, tree: &PropertyTree) -> Result<(), XmlError> {
    let xml = codec.encode(ROOT_ELEMENT, tree)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, xml)?;
    Ok(())
}
