//! Line-delimited JSON tool protocol.
//!
//! Requests and responses are single-line JSON objects on stdio. A request
//! carries an id, a method name, and an arguments object; a response
//! echoes the id with either a result or a typed error. Framing survives
//! every failure — one bad request produces one error response and the
//! stream stays usable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An incoming tool request.
#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

/// Error kinds surfaced across the tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    RateLimited,
    Cancelled,
    Internal,
    Unavailable,
}

/// A typed tool failure.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            message: "operation cancelled".into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Internal,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unavailable,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// An outgoing response: result and error are mutually exclusive.
#[derive(Debug, Serialize)]
pub struct Response {
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: Value, error: ToolError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Serialize to a single protocol line. Serialization failures fall
    /// back to a minimal hand-built error frame so the stream never
    /// breaks.
    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"id":null,"error":{"kind":"internal","message":"response serialization failed"}}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_defaults() {
        let req: Request =
            serde_json::from_str(r#"{"id": 1, "method": "index_stats"}"#).unwrap();
        assert_eq!(req.id, serde_json::json!(1));
        assert_eq!(req.method, "index_stats");
        assert!(req.arguments.is_null());
    }

    #[test]
    fn response_lines_are_single_json_objects() {
        let ok = Response::ok(serde_json::json!("a1"), serde_json::json!({"n": 1}));
        let line = ok.to_line();
        assert!(!line.contains('\n'));
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["id"], "a1");
        assert_eq!(parsed["result"]["n"], 1);
        assert!(parsed.get("error").is_none());
    }

    #[test]
    fn error_kinds_serialize_snake_case() {
        let err = Response::err(
            Value::Null,
            ToolError::invalid_argument("bad path"),
        );
        let parsed: Value = serde_json::from_str(&err.to_line()).unwrap();
        assert_eq!(parsed["error"]["kind"], "invalid_argument");
        assert_eq!(parsed["error"]["message"], "bad path");

        let err = Response::err(Value::Null, ToolError::rate_limited("slow down"));
        let parsed: Value = serde_json::from_str(&err.to_line()).unwrap();
        assert_eq!(parsed["error"]["kind"], "rate_limited");
    }
}
