//! Error taxonomy for repository synchronization

use regex::Regex;

use crate::value::TypeTag;

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, JcrError>;

/// Failure reported by the HTTP transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Status {
        status: u16,
        body: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// Build a status error, deriving the human-readable message from the body
    pub fn from_status(status: u16, body: String) -> Self {
        let message = friendly_message(status, &body);
        TransportError::Status {
            status,
            body,
            message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}

/// Value Codec failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Unknown property type: {0}")]
    UnknownType(String),

    #[error("Malformed type prefix in {0:?}")]
    MalformedTypePrefix(String),

    #[error("Value {value:?} is not a valid {tag}")]
    InvalidValue { value: String, tag: TypeTag },

    #[error("Child nodes have no textual value form")]
    NotAProperty,
}

/// XML content file errors
#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate sibling <{name}> under {parent}")]
    DuplicateSibling { parent: String, name: String },

    #[error("Invalid XML structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid value for {attribute}: {source}")]
    Value {
        attribute: String,
        #[source]
        source: CodecError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the repository façade and the property writer
#[derive(Debug, thiserror::Error)]
pub enum JcrError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A save, delete or move that failed or did not take effect
    #[error("{message} ({path})")]
    Operation { path: String, message: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Xml(#[from] XmlError),

    #[error("Cannot move {src} to {dst}: source and destination are on different hosts")]
    CrossHostMove { src: String, dst: String },
}

impl JcrError {
    pub fn operation(path: impl Into<String>, message: impl Into<String>) -> Self {
        JcrError::Operation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap a transport failure with the operation that triggered it
    pub fn wrap(path: &str, action: &str, err: TransportError) -> Self {
        JcrError::Operation {
            path: path.to_string(),
            message: format!("Failed to {}: {}", action, err),
        }
    }
}

lazy_static::lazy_static! {
    static ref HTML_MESSAGE: Regex =
        Regex::new(r#"(?is)<div id="Message">\s*(.*?)\s*</div>"#).unwrap();
    static ref HTML_TITLE: Regex = Regex::new(r"(?is)<title>\s*(.*?)\s*</title>").unwrap();
    static ref HTML_HEADING: Regex = Regex::new(r"(?is)<h1>\s*(.*?)\s*</h1>").unwrap();
}

/// Human-readable message for a failed response.
///
/// Server errors (5xx) prefer the JSON `error.message` field, then the Sling
/// error page markers. Everything else reports the body as-is.
pub fn friendly_message(status: u16, body: &str) -> String {
    if status >= 500 {
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(msg) = json
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                return msg.to_string();
            }
        }
        for marker in [&*HTML_MESSAGE, &*HTML_TITLE, &*HTML_HEADING] {
            if let Some(found) = marker.captures(body).and_then(|c| c.get(1)) {
                let text = found.as_str().trim();
                if !text.is_empty() {
                    return text.to_string();
                }
            }
        }
        return format!("Server error {}", status);
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("Request failed with status {}", status)
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_friendly_message_json() {
        let body = r#"{"error":{"class":"javax.jcr.RepositoryException","message":"Constraint violation"}}"#;
        assert_eq!(friendly_message(500, body), "Constraint violation");
    }

    #[test]
    fn test_friendly_message_html() {
        let body = r#"<html><head><title>500 Internal</title></head><body>
            <div id="Message">javax.jcr.nodetype.ConstraintViolationException: no matching property definition</div>
            </body></html>"#;
        assert_eq!(
            friendly_message(500, body),
            "javax.jcr.nodetype.ConstraintViolationException: no matching property definition"
        );

        let title_only = "<html><title>Service Unavailable</title></html>";
        assert_eq!(friendly_message(503, title_only), "Service Unavailable");
        assert_eq!(friendly_message(502, "garbage"), "Server error 502");
    }

    #[test]
    fn test_client_errors_propagate_body() {
        assert_eq!(friendly_message(403, " denied "), "denied");
        assert_eq!(friendly_message(404, ""), "Request failed with status 404");
    }

    #[test]
    fn test_not_found_detection() {
        let err = TransportError::from_status(404, String::new());
        assert!(err.is_not_found());
        assert!(!TransportError::Network("down".into()).is_not_found());
        assert!(TransportError::from_status(401, String::new()).is_unauthorized());
    }
}
