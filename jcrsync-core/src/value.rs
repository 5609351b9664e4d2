//! Property values and JCR type tags
//!
//! A property is either a single [`Scalar`] or a homogeneous array of them.
//! Child nodes are carried by [`Value::Node`] so that one ordered map can hold
//! a whole node (see [`crate::tree::PropertyTree`]).

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::tree::PropertyTree;

lazy_static::lazy_static! {
    static ref ISO_TIMESTAMP: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d{1,9})?(Z|[+-]\d{2}:\d{2})?$"
    )
    .unwrap();
}

/// JCR property type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    String,
    Boolean,
    Long,
    Double,
    Date,
    Decimal,
    Name,
    Path,
    Reference,
    WeakReference,
    Uri,
    Binary,
}

impl TypeTag {
    pub const ALL: [TypeTag; 12] = [
        TypeTag::String,
        TypeTag::Boolean,
        TypeTag::Long,
        TypeTag::Double,
        TypeTag::Date,
        TypeTag::Decimal,
        TypeTag::Name,
        TypeTag::Path,
        TypeTag::Reference,
        TypeTag::WeakReference,
        TypeTag::Uri,
        TypeTag::Binary,
    ];

    /// Name used in `{Type}` prefixes and `@TypeHint` fields
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::String => "String",
            TypeTag::Boolean => "Boolean",
            TypeTag::Long => "Long",
            TypeTag::Double => "Double",
            TypeTag::Date => "Date",
            TypeTag::Decimal => "Decimal",
            TypeTag::Name => "Name",
            TypeTag::Path => "Path",
            TypeTag::Reference => "Reference",
            TypeTag::WeakReference => "WeakReference",
            TypeTag::Uri => "URI",
            TypeTag::Binary => "Binary",
        }
    }

    /// Name shown by the editor-facing schema layer.
    ///
    /// Upstream node type definitions report every type in upper case except
    /// the weak reference, which keeps its title-case spelling.
    pub fn schema_name(self) -> &'static str {
        match self {
            TypeTag::String => "STRING",
            TypeTag::Boolean => "BOOLEAN",
            TypeTag::Long => "LONG",
            TypeTag::Double => "DOUBLE",
            TypeTag::Date => "DATE",
            TypeTag::Decimal => "DECIMAL",
            TypeTag::Name => "NAME",
            TypeTag::Path => "PATH",
            TypeTag::Reference => "REFERENCE",
            TypeTag::WeakReference => "WeakReference",
            TypeTag::Uri => "URI",
            TypeTag::Binary => "BINARY",
        }
    }

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A type tag plus multiplicity (`Long` vs `Long[]`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyType {
    pub tag: TypeTag,
    pub multiple: bool,
}

impl PropertyType {
    pub fn single(tag: TypeTag) -> Self {
        Self { tag, multiple: false }
    }

    pub fn array(tag: TypeTag) -> Self {
        Self { tag, multiple: true }
    }

    pub fn schema_name(&self) -> String {
        if self.multiple {
            format!("{}[]", self.tag.schema_name())
        } else {
            self.tag.schema_name().to_string()
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.multiple {
            write!(f, "{}[]", self.tag)
        } else {
            write!(f, "{}", self.tag)
        }
    }
}

impl FromStr for PropertyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, multiple) = match s.strip_suffix("[]") {
            Some(base) => (base, true),
            None => (s, false),
        };
        TypeTag::from_name(name)
            .map(|tag| PropertyType { tag, multiple })
            .ok_or_else(|| format!("unknown property type: {}", s))
    }
}

/// ISO-8601 timestamp kept in its original textual form
///
/// JCR dates may omit the zone designator, which `chrono` cannot represent
/// losslessly, so the text is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Timestamp(String);

impl Timestamp {
    /// Accepts `YYYY-MM-DDTHH:MM:SS[.fff][Z|±HH:MM]`
    pub fn parse(text: &str) -> Option<Self> {
        if ISO_TIMESTAMP.is_match(text) {
            Some(Self(text.to_string()))
        } else {
            None
        }
    }

    /// Accepts ISO-8601 text as well as the ECMA rendering Sling uses in
    /// JSON (`Tue Mar 05 2024 10:12:33 GMT+0100`, optionally followed by a
    /// zone name in parentheses)
    pub fn parse_remote(text: &str) -> Option<Self> {
        if let Some(ts) = Self::parse(text) {
            return Some(ts);
        }
        let text = text.split(" (").next().unwrap_or(text).trim();
        DateTime::parse_from_str(text, "%a %b %d %Y %H:%M:%S GMT%z")
            .ok()
            .map(Self::from)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether both denote the same instant
    pub fn same_instant(&self, other: &Timestamp) -> bool {
        match (self.to_datetime(), other.to_datetime()) {
            (Some(a), Some(b)) => a == b,
            _ => self.0 == other.0,
        }
    }

    /// Interpret as an instant; zone-less values are taken as UTC
    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(&self.0) {
            return Some(dt);
        }
        NaiveDateTime::parse_from_str(&self.0, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single property value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Long(i64),
    Double(f64),
    Date(Timestamp),
}

impl Scalar {
    /// Tag inferred from the runtime shape of the value
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Scalar::String(_) => TypeTag::String,
            Scalar::Boolean(_) => TypeTag::Boolean,
            Scalar::Long(_) => TypeTag::Long,
            Scalar::Double(_) => TypeTag::Double,
            Scalar::Date(_) => TypeTag::Date,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Plain text rendering used both on the wire and for change detection
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::String(s) => f.write_str(s),
            Scalar::Boolean(b) => write!(f, "{}", b),
            Scalar::Long(n) => write!(f, "{}", n),
            Scalar::Double(n) => write!(f, "{}", n),
            Scalar::Date(ts) => write!(f, "{}", ts),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Long(n)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Double(n)
    }
}

/// Entry of a [`PropertyTree`]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Array(Vec<Scalar>),
    Node(PropertyTree),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::String(s.into()))
    }

    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Array(items.into_iter().map(|s| Scalar::String(s.into())).collect())
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Scalar]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&PropertyTree> {
        match self {
            Value::Node(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_str)
    }

    /// Inferred type; `None` for child nodes. Empty arrays are string arrays.
    pub fn property_type(&self) -> Option<PropertyType> {
        match self {
            Value::Scalar(s) => Some(PropertyType::single(s.type_tag())),
            Value::Array(items) => Some(PropertyType::array(
                items.first().map(Scalar::type_tag).unwrap_or(TypeTag::String),
            )),
            Value::Node(_) => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Scalar(s.into())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Scalar(b.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Scalar(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Scalar(n.into())
    }
}

impl From<PropertyTree> for Value {
    fn from(tree: PropertyTree) -> Self {
        Value::Node(tree)
    }
}
