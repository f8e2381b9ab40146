//! Durable one-file-per-event JSON record shape.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tapline_types::error::EngineError;
use tapline_types::message::Message;

/// On-disk record written for each store/dead-letter event.
#[derive(Debug, Serialize)]
pub(crate) struct DurableRecord<'a> {
    pub message_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<&'a str>,
    /// Pipeline stage label for store entries, failure reason for
    /// dead-letter entries.
    pub context: &'a str,
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub payload: &'a serde_json::Value,
    pub headers: &'a BTreeMap<String, String>,
}

impl<'a> DurableRecord<'a> {
    pub(crate) fn new(message: &'a Message, context: &'a str, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_id: message.id(),
            correlation_id: message.correlation_id(),
            context,
            timestamp,
            kind: message.kind.to_string(),
            payload: &message.payload,
            headers: &message.headers,
        }
    }

    /// Write the record as pretty JSON. Never overwrites: callers name
    /// files by message id, timestamp, and [`file_sequence`] so repeated
    /// events of the same message within one millisecond do not collide.
    pub(crate) fn write_to(&self, path: &Path) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::Store(format!("serialize record: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| EngineError::Store(format!("write {}: {e}", path.display())))?;
        Ok(())
    }
}

/// Filesystem-safe timestamp suffix for per-event filenames.
pub(crate) fn file_timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d_%H-%M-%S%.3f").to_string()
}

/// Process-wide monotonic counter disambiguating same-millisecond events.
pub(crate) fn file_sequence() -> u64 {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}
