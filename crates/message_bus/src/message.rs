use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Discriminates the three envelope kinds carried on the bus.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Request,
    Response,
    Error,
}

/// Machine-readable classification for Error envelopes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoHandlerFound,
    HandlerTimeout,
    UnsupportedMessageType,
    HandlerFailed,
}

/// A single file inside a project snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
}

/// Snapshot of a project's file tree, as produced by scanning capabilities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSnapshot {
    pub root: String,
    pub files: Vec<FileEntry>,
}

impl ProjectSnapshot {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
        }
    }

    pub fn contains_path_ending_with(&self, suffix: &str) -> bool {
        self.files.iter().any(|f| f.path.ends_with(suffix))
    }
}

/// Typed payload union. Callers consume payloads through the variant they
/// expect instead of downcasting untyped bags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Payload {
    /// Flat key-value data.
    Data(HashMap<String, Value>),
    /// A project-structure snapshot.
    ProjectStructure(ProjectSnapshot),
    /// Raw free text, typically generative-backend output.
    Text(String),
    Empty,
}

impl Payload {
    pub fn data(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Payload::Data(entries.into_iter().collect())
    }

    /// Look up a key in a `Data` payload. Returns `None` for other variants.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Payload::Data(map) => map.get(key),
            _ => None,
        }
    }

    /// String view of a `Data` entry or of a `Text` payload.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self {
            Payload::Data(map) => map.get(key).and_then(Value::as_str),
            Payload::Text(text) if key.is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_snapshot(&self) -> Option<&ProjectSnapshot> {
        match self {
            Payload::ProjectStructure(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Immutable envelope exchanged on the bus.
///
/// A `Response` or `Error` always carries `correlates_to` referencing the
/// originating request id; the bus enforces this before handing an envelope
/// back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub message_type: String,
    pub kind: MessageKind,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlates_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub success: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn request(
        sender_id: impl Into<String>,
        message_type: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            message_type: message_type.into(),
            kind: MessageKind::Request,
            payload,
            correlates_to: None,
            error_code: None,
            success: true,
            created_at: Utc::now(),
        }
    }

    /// Build a successful response correlated to `request`.
    pub fn response(request: &Message, sender_id: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            message_type: request.message_type.clone(),
            kind: MessageKind::Response,
            payload,
            correlates_to: Some(request.id),
            error_code: None,
            success: true,
            created_at: Utc::now(),
        }
    }

    /// Build an error envelope correlated to `request`, carrying the
    /// failure text as its payload.
    pub fn error(
        request: &Message,
        sender_id: impl Into<String>,
        code: ErrorCode,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id: sender_id.into(),
            message_type: request.message_type.clone(),
            kind: MessageKind::Error,
            payload: Payload::Text(detail.into()),
            correlates_to: Some(request.id),
            error_code: Some(code),
            success: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }

    /// Failure text of an error envelope, if any.
    pub fn error_detail(&self) -> Option<&str> {
        if self.is_error() {
            self.payload.as_text()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_correlates_to_request() {
        let request = Message::request("tester", "PING", Payload::Empty);
        let response = Message::response(&request, "handler", Payload::Text("pong".into()));

        assert_eq!(response.kind, MessageKind::Response);
        assert_eq!(response.correlates_to, Some(request.id));
        assert_eq!(response.message_type, "PING");
        assert!(response.success);
    }

    #[test]
    fn error_carries_code_and_detail() {
        let request = Message::request("tester", "PING", Payload::Empty);
        let error = Message::error(&request, "bus", ErrorCode::NoHandlerFound, "no handler");

        assert!(error.is_error());
        assert!(!error.success);
        assert_eq!(error.error_code, Some(ErrorCode::NoHandlerFound));
        assert_eq!(error.error_detail(), Some("no handler"));
        assert_eq!(error.correlates_to, Some(request.id));
    }

    #[test]
    fn data_payload_lookup() {
        let payload = Payload::data([
            ("path".to_string(), json!("/tmp/project")),
            ("depth".to_string(), json!(2)),
        ]);

        assert_eq!(payload.get_str("path"), Some("/tmp/project"));
        assert_eq!(payload.get("depth"), Some(&json!(2)));
        assert!(payload.get("missing").is_none());
        assert!(payload.as_snapshot().is_none());
    }

    #[test]
    fn snapshot_suffix_lookup() {
        let mut snapshot = ProjectSnapshot::new("/tmp/project");
        snapshot.files.push(FileEntry {
            path: "src/Main.kt".to_string(),
            size: 120,
        });

        assert!(snapshot.contains_path_ending_with("Main.kt"));
        assert!(!snapshot.contains_path_ending_with("Main.rs"));
    }
}
