//! Value Codec
//!
//! Textual form of property values as used in content files:
//!
//! - scalars are plain text; a leading `[` or `{` is backslash-escaped
//! - arrays are `[v1,v2,...]` with `,` and `]` escaped inside elements
//! - `[\0]` is an array holding one empty string, `[]` an empty array
//! - an optional `{Type}` prefix pins the type (`{Long}42`, `{Date}[...]`)
//!
//! Without a prefix the type is inferred: `true`/`false` are booleans,
//! ISO-8601 timestamps are dates, numbers whose text survives a round trip are
//! doubles, everything else is a string.

use crate::error::CodecError;
use crate::value::{PropertyType, Scalar, Timestamp, TypeTag, Value};

/// Marker for the empty string inside an array
const EMPTY_MARKER: &str = "\\0";

/// Result of decoding one attribute value
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub value: Value,
    pub property_type: PropertyType,
    /// Whether the type came from a `{Type}` prefix or a caller hint
    pub explicit: bool,
}

/// Serialize a scalar or array without a type prefix
pub fn serialize(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Scalar(s) => Ok(escape(&s.to_string(), false)),
        Value::Array(items) => Ok(serialize_array(items)),
        Value::Node(_) => Err(CodecError::NotAProperty),
    }
}

/// Serialize, adding a `{Type}` prefix whenever decoding the bare text would
/// not give back the same value and type.
pub fn serialize_typed(value: &Value, hint: Option<PropertyType>) -> Result<String, CodecError> {
    let text = serialize(value)?;
    let inferred = value.property_type().ok_or(CodecError::NotAProperty)?;
    let target = match hint {
        Some(hint) => PropertyType {
            tag: hint.tag,
            multiple: inferred.multiple,
        },
        None => inferred,
    };

    let bare = deserialize(&text, None)?;
    if bare.property_type == target && bare.value == *value {
        Ok(text)
    } else {
        Ok(format!("{{{}}}{}", target.tag.name(), text))
    }
}

fn serialize_array(items: &[Scalar]) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    if items.len() == 1 && items[0].as_str() == Some("") {
        return format!("[{}]", EMPTY_MARKER);
    }
    let parts: Vec<String> = items.iter().map(|s| escape(&s.to_string(), true)).collect();
    format!("[{}]", parts.join(","))
}

fn escape(text: &str, in_array: bool) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '[' | '{' if i == 0 => {
                out.push('\\');
                out.push(c);
            }
            ',' | ']' if in_array => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Undo [`escape`]: `\uXXXX` is a code point, `\0` the empty string, and any
/// other `\X` the literal `X`.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => {}
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        out.push(decoded);
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Deserialize text into a value, using `hint` when no `{Type}` prefix is present
pub fn deserialize(text: &str, hint: Option<PropertyType>) -> Result<Decoded, CodecError> {
    let (prefix_tag, body) = split_type_prefix(text)?;
    let explicit_tag = prefix_tag.or(hint.map(|h| h.tag));

    if body.starts_with('[') {
        let raw = split_array(body);
        let (items, tag) = decode_elements(&raw, explicit_tag)?;
        return Ok(Decoded {
            value: Value::Array(items),
            property_type: PropertyType::array(tag),
            explicit: explicit_tag.is_some(),
        });
    }

    let plain = unescape(body);
    let scalar = match explicit_tag {
        Some(tag) => convert(&plain, tag)?,
        None => infer(&plain),
    };
    Ok(Decoded {
        property_type: PropertyType::single(explicit_tag.unwrap_or_else(|| scalar.type_tag())),
        value: Value::Scalar(scalar),
        explicit: explicit_tag.is_some(),
    })
}

fn split_type_prefix(text: &str) -> Result<(Option<TypeTag>, &str), CodecError> {
    let Some(rest) = text.strip_prefix('{') else {
        return Ok((None, text));
    };
    let Some(end) = rest.find('}') else {
        return Err(CodecError::MalformedTypePrefix(text.to_string()));
    };
    let name = &rest[..end];
    let tag = TypeTag::from_name(name).ok_or_else(|| CodecError::UnknownType(name.to_string()))?;
    Ok((Some(tag), &rest[end + 1..]))
}

/// Split `[a,b\,c]` into its raw (still escaped) elements
fn split_array(body: &str) -> Vec<String> {
    let inner = &body[1..];
    if inner.starts_with(']') {
        return Vec::new();
    }

    let mut elements = Vec::new();
    let mut current = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => elements.push(std::mem::take(&mut current)),
            ']' => break,
            _ => current.push(c),
        }
    }
    elements.push(current);
    elements
}

fn decode_elements(
    raw: &[String],
    explicit: Option<TypeTag>,
) -> Result<(Vec<Scalar>, TypeTag), CodecError> {
    let texts: Vec<String> = raw.iter().map(|e| unescape(e)).collect();

    if let Some(tag) = explicit {
        let items = texts
            .iter()
            .map(|t| convert(t, tag))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((items, tag));
    }

    let inferred: Vec<Scalar> = texts.iter().map(|t| infer(t)).collect();
    let tag = inferred.first().map(Scalar::type_tag).unwrap_or(TypeTag::String);
    if inferred.iter().all(|s| s.type_tag() == tag) {
        Ok((inferred, tag))
    } else {
        // mixed shapes: keep the array homogeneous
        Ok((texts.into_iter().map(Scalar::String).collect(), TypeTag::String))
    }
}

fn convert(text: &str, tag: TypeTag) -> Result<Scalar, CodecError> {
    let invalid = || CodecError::InvalidValue {
        value: text.to_string(),
        tag,
    };
    match tag {
        TypeTag::Boolean => match text {
            "true" => Ok(Scalar::Boolean(true)),
            "false" => Ok(Scalar::Boolean(false)),
            _ => Err(invalid()),
        },
        TypeTag::Long => text.parse().map(Scalar::Long).map_err(|_| invalid()),
        TypeTag::Double => text.parse().map(Scalar::Double).map_err(|_| invalid()),
        TypeTag::Date => Timestamp::parse(text).map(Scalar::Date).ok_or_else(invalid),
        _ => Ok(Scalar::String(text.to_string())),
    }
}

/// Deterministic type inference for untyped text
pub fn infer(text: &str) -> Scalar {
    match text {
        "true" => return Scalar::Boolean(true),
        "false" => return Scalar::Boolean(false),
        _ => {}
    }
    if let Some(ts) = Timestamp::parse(text) {
        return Scalar::Date(ts);
    }
    if let Ok(n) = text.parse::<f64>() {
        // only when the text is the canonical rendering, so "007" stays a string
        if n.is_finite() && n.to_string() == text {
            return Scalar::Double(n);
        }
    }
    Scalar::String(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode(text: &str) -> Value {
        deserialize(text, None).unwrap().value
    }

    #[test]
    fn test_escape_leading_brackets() {
        assert_eq!(serialize(&Value::from("[x]")).unwrap(), "\\[x]");
        assert_eq!(serialize(&Value::from("{y}")).unwrap(), "\\{y}");
        assert_eq!(serialize(&Value::from("a[b")).unwrap(), "a[b");
        assert_eq!(decode("\\[x]"), Value::from("[x]"));
        assert_eq!(decode("\\{y}"), Value::from("{y}"));
    }

    #[test]
    fn test_array_encoding() {
        assert_eq!(serialize(&Value::strings(["a", "b,c"])).unwrap(), "[a,b\\,c]");
        assert_eq!(serialize(&Value::strings(Vec::<String>::new())).unwrap(), "[]");
        assert_eq!(serialize(&Value::strings([""])).unwrap(), "[\\0]");
        assert_eq!(decode("[a,b\\,c]"), Value::strings(["a", "b,c"]));
    }

    #[test]
    fn test_empty_array_distinct_from_single_empty_string() {
        let empty = Value::strings(Vec::<String>::new());
        let single = Value::strings([""]);
        let e = decode(&serialize(&empty).unwrap());
        let s = decode(&serialize(&single).unwrap());
        assert_eq!(e, empty);
        assert_eq!(s, single);
        assert_ne!(e, s);
    }

    #[test]
    fn test_empty_marker_outside_array() {
        assert_eq!(decode("\\0"), Value::from(""));
    }

    #[test]
    fn test_unicode_escape() {
        assert_eq!(unescape("caf\\u00e9"), "café");
        assert_eq!(unescape("\\,\\[\\{"), ",[{");
        assert_eq!(unescape("\\uZZ"), "uZZ");
    }

    #[test]
    fn test_inference() {
        assert_eq!(decode("true"), Value::from(true));
        assert_eq!(decode("false"), Value::from(false));
        assert_eq!(decode("1.5"), Value::from(1.5));
        assert_eq!(decode("007"), Value::from("007"));
        assert_eq!(decode("TRUE"), Value::from("TRUE"));
        assert_eq!(decode("NaN"), Value::from("NaN"));
        let date = deserialize("2024-05-06T07:08:09.000+02:00", None).unwrap();
        assert_eq!(date.property_type, PropertyType::single(TypeTag::Date));
        assert!(!date.explicit);
    }

    #[test]
    fn test_type_prefix() {
        let d = deserialize("{Long}42", None).unwrap();
        assert_eq!(d.value, Value::from(42i64));
        assert_eq!(d.property_type.to_string(), "Long");
        assert!(d.explicit);

        let d = deserialize("{Long}[1,2]", None).unwrap();
        assert_eq!(d.value, Value::Array(vec![Scalar::Long(1), Scalar::Long(2)]));
        assert_eq!(d.property_type.to_string(), "Long[]");

        let d = deserialize("{WeakReference}abc-123", None).unwrap();
        assert_eq!(d.value, Value::from("abc-123"));
        assert_eq!(d.property_type.tag, TypeTag::WeakReference);
    }

    #[test]
    fn test_invalid_typed_value() {
        assert!(matches!(
            deserialize("{Long}abc", None),
            Err(CodecError::InvalidValue { tag: TypeTag::Long, .. })
        ));
        assert!(matches!(
            deserialize("{Whatever}x", None),
            Err(CodecError::UnknownType(_))
        ));
    }

    #[test]
    fn test_hint_applies_without_prefix() {
        let d = deserialize("12", Some(PropertyType::single(TypeTag::Long))).unwrap();
        assert_eq!(d.value, Value::from(12i64));
    }

    #[test]
    fn test_serialize_typed_prefixes_only_when_needed() {
        assert_eq!(serialize_typed(&Value::from("hello"), None).unwrap(), "hello");
        assert_eq!(serialize_typed(&Value::from(true), None).unwrap(), "true");
        assert_eq!(serialize_typed(&Value::from("true"), None).unwrap(), "{String}true");
        assert_eq!(serialize_typed(&Value::from(7i64), None).unwrap(), "{Long}7");
        assert_eq!(
            serialize_typed(
                &Value::from("/content/a"),
                Some(PropertyType::single(TypeTag::Path))
            )
            .unwrap(),
            "{Path}/content/a"
        );
        assert_eq!(
            serialize_typed(&Value::Array(vec![]), Some(PropertyType::array(TypeTag::Long))).unwrap(),
            "{Long}[]"
        );
    }

    #[test]
    fn test_node_is_not_serializable() {
        let node = Value::Node(Default::default());
        assert!(matches!(serialize(&node), Err(CodecError::NotAProperty)));
    }

    proptest! {
        #[test]
        fn prop_string_round_trip(s in "\\PC*") {
            let value = Value::from(s.as_str());
            let text = serialize_typed(&value, None).unwrap();
            prop_assert_eq!(deserialize(&text, None).unwrap().value, value);
        }

        #[test]
        fn prop_string_array_round_trip(items in prop::collection::vec("[a-z,\\]\\[{}\\\\ ]{0,6}", 0..5)) {
            let value = Value::strings(items);
            let text = serialize_typed(&value, None).unwrap();
            prop_assert_eq!(deserialize(&text, None).unwrap().value, value);
        }

        #[test]
        fn prop_long_round_trip(n in any::<i64>()) {
            let value = Value::from(n);
            let text = serialize_typed(&value, None).unwrap();
            prop_assert_eq!(deserialize(&text, None).unwrap().value, value);
        }

        #[test]
        fn prop_double_round_trip(n in -1.0e12f64..1.0e12) {
            let value = Value::from(n);
            let text = serialize_typed(&value, None).unwrap();
            prop_assert_eq!(deserialize(&text, None).unwrap().value, value);
        }
    }
}
