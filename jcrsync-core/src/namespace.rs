//! Namespace prefixes known to content files

use std::collections::BTreeMap;

const WELL_KNOWN: &[(&str, &str)] = &[
    ("jcr", "http://www.jcp.org/jcr/1.0"),
    ("nt", "http://www.jcp.org/jcr/nt/1.0"),
    ("mix", "http://www.jcp.org/jcr/mix/1.0"),
    ("sling", "http://sling.apache.org/jcr/sling/1.0"),
    ("cq", "http://www.day.com/jcr/cq/1.0"),
    ("dam", "http://www.day.com/dam/1.0"),
    ("granite", "http://www.adobe.com/jcr/granite/1.0"),
    ("oak", "http://jackrabbit.apache.org/oak/ns/1.0"),
    ("rep", "internal"),
    ("vlt", "http://www.day.com/jcr/vault/1.0"),
    ("sv", "http://www.jcp.org/jcr/sv/1.0"),
    ("fn", "http://www.w3.org/2005/xpath-functions"),
    ("xs", "http://www.w3.org/2001/XMLSchema"),
];

/// Prefix -> URI table used when writing `xmlns:*` declarations.
///
/// Constructed by the caller and handed to the XML codec; extra prefixes can
/// be registered when a project uses custom namespaces.
#[derive(Debug, Clone)]
pub struct NamespaceRegistry {
    uris: BTreeMap<String, String>,
}

impl NamespaceRegistry {
    /// Registry pre-populated with the JCR, Sling and AEM prefixes
    pub fn new() -> Self {
        Self {
            uris: WELL_KNOWN
                .iter()
                .map(|(p, u)| (p.to_string(), u.to_string()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            uris: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, prefix: impl Into<String>, uri: impl Into<String>) {
        self.uris.insert(prefix.into(), uri.into());
    }

    pub fn uri(&self, prefix: &str) -> Option<&str> {
        self.uris.get(prefix).map(String::as_str)
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.uris.contains_key(prefix)
    }

    /// Registered prefix of a qualified name or value (`cq:Page` -> `cq`)
    pub fn prefix_of<'a>(&self, qualified: &'a str) -> Option<&'a str> {
        let (prefix, rest) = qualified.split_once(':')?;
        if rest.is_empty() || !self.contains(prefix) {
            return None;
        }
        Some(prefix)
    }
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
