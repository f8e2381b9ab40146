//! Message envelope carried through the pipeline.
//!
//! [`Message`] is the unit of flow between endpoints and transformers.
//! Identity (`id`, `created_at`) is fixed at construction; a transformer
//! that produces a new message for the same flow must build it with
//! [`Message::continuing`] so the wire tap can correlate pipeline stages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a message in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Data payload flowing through a pipeline.
    Document,
    /// Engine lifecycle notification (job-start, job-success, ...).
    Event,
    /// Control instruction.
    Command,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Document => "document",
            Self::Event => "event",
            Self::Command => "command",
        };
        f.write_str(s)
    }
}

/// Envelope carrying a payload plus routing/correlation metadata.
///
/// Headers are an ordered, unique-keyed string map. The payload is opaque
/// to the envelope: raw rows, JSON text, or structured records depending
/// on pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    created_at: DateTime<Utc>,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Message {
    fn new(kind: MessageKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            correlation_id: None,
            created_at: Utc::now(),
            kind,
            payload,
            headers: BTreeMap::new(),
        }
    }

    /// Data-bearing message.
    #[must_use]
    pub fn document(payload: serde_json::Value) -> Self {
        Self::new(MessageKind::Document, payload)
    }

    /// Lifecycle event message with an empty payload.
    #[must_use]
    pub fn event() -> Self {
        Self::new(MessageKind::Event, serde_json::Value::Null)
    }

    /// Control command message with an empty payload.
    #[must_use]
    pub fn command() -> Self {
        Self::new(MessageKind::Command, serde_json::Value::Null)
    }

    /// Data message tagged with a caller-supplied correlation id.
    #[must_use]
    pub fn with_correlation(correlation_id: impl Into<String>, payload: serde_json::Value) -> Self {
        let mut msg = Self::document(payload);
        msg.correlation_id = Some(correlation_id.into());
        msg
    }

    /// New message that logically continues `original`'s flow.
    ///
    /// Copies `id`, `correlation_id`, `created_at`, `kind`, and headers
    /// forward; only the payload differs. This is the required way for
    /// transformers to produce their output.
    #[must_use]
    pub fn continuing(original: &Message, payload: serde_json::Value) -> Self {
        Self {
            id: original.id.clone(),
            correlation_id: original.correlation_id.clone(),
            created_at: original.created_at,
            kind: original.kind,
            payload,
            headers: original.headers.clone(),
        }
    }

    /// Unique identifier, fixed at construction.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Caller-supplied correlation id, if any.
    #[must_use]
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Set the correlation id used to group related messages.
    pub fn set_correlation_id(&mut self, correlation_id: impl Into<String>) {
        self.correlation_id = Some(correlation_id.into());
    }

    /// Construction timestamp, fixed for the lifetime of the flow.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Insert or overwrite a header.
    pub fn set_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(key.into(), value.into());
    }

    /// Read a header value.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_has_unique_id_and_timestamp() {
        let a = Message::document(serde_json::json!([1, 2]));
        let b = Message::document(serde_json::json!([1, 2]));
        assert_ne!(a.id(), b.id());
        assert_eq!(a.kind, MessageKind::Document);
        assert!(a.correlation_id().is_none());
    }

    #[test]
    fn continuing_preserves_identity() {
        let mut original = Message::with_correlation("corr-1", serde_json::json!({"x": 1}));
        original.set_header("stage", "extract");

        let next = Message::continuing(&original, serde_json::json!({"x": 2}));
        assert_eq!(next.id(), original.id());
        assert_eq!(next.correlation_id(), Some("corr-1"));
        assert_eq!(next.created_at(), original.created_at());
        assert_eq!(next.header("stage"), Some("extract"));
        assert_eq!(next.payload, serde_json::json!({"x": 2}));
    }

    #[test]
    fn headers_are_unique_keyed() {
        let mut msg = Message::event();
        msg.set_header("action", "job-start");
        msg.set_header("action", "job-success");
        assert_eq!(msg.header("action"), Some("job-success"));
        assert_eq!(msg.headers.len(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let mut msg = Message::with_correlation("run-7", serde_json::json!([{"id": 1}]));
        msg.set_header("source", "orders");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn kind_serde_is_snake_case() {
        let json = serde_json::to_string(&MessageKind::Document).unwrap();
        assert_eq!(json, "\"document\"");
    }
}
