//! Queryable history of tapped messages.
//!
//! The store keeps at most `capacity` tap events in memory, evicting the
//! oldest first, and optionally mirrors every event to a durable JSON
//! file. The same message id appears once per stage it passed through.
//! Reads run concurrently; writes are serialized.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tapline_types::error::{EngineError, Result};
use tapline_types::message::Message;

use crate::record::{file_sequence, file_timestamp, DurableRecord};

/// One intercepted message plus where and when it was observed.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub message: Message,
    /// Stage label, e.g. `"pipeline-input"`.
    pub context: String,
    pub observed_at: DateTime<Utc>,
}

/// Bounded, concurrently-readable message history.
pub struct MessageStore {
    entries: RwLock<VecDeque<StoredMessage>>,
    capacity: usize,
    durable_dir: Option<PathBuf>,
}

impl MessageStore {
    /// In-memory store holding at most `capacity` tap events.
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity,
            durable_dir: None,
        }
    }

    /// Store that additionally writes one JSON file per tapped message
    /// under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the directory cannot be created.
    pub fn durable(capacity: usize, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Store(format!("create {}: {e}", dir.display())))?;
        tracing::info!(dir = %dir.display(), capacity, "Message store initialized");
        Ok(Self {
            entries: RwLock::new(VecDeque::new()),
            capacity,
            durable_dir: Some(dir),
        })
    }

    /// Record a message under a stage label.
    ///
    /// Durable-write failures are logged, not surfaced: observability must
    /// never fail a pipeline run.
    pub fn save(&self, message: &Message, context: &str) {
        let observed_at = Utc::now();
        let stored = StoredMessage {
            message: message.clone(),
            context: context.to_string(),
            observed_at,
        };

        if let Some(dir) = &self.durable_dir {
            let filename = format!(
                "message-{}-{}-{}.json",
                message.id(),
                file_timestamp(observed_at),
                file_sequence()
            );
            let record = DurableRecord::new(message, context, observed_at);
            if let Err(e) = record.write_to(&dir.join(filename)) {
                tracing::error!(message_id = message.id(), error = %e, "Durable store write failed");
            }
        }

        let mut entries = self.write_lock();
        entries.push_back(stored);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        tracing::debug!(message_id = message.id(), context, "Message stored");
    }

    /// Latest stored version of a message id.
    #[must_use]
    pub fn get(&self, message_id: &str) -> Option<Message> {
        self.read_lock()
            .iter()
            .rev()
            .find(|s| s.message.id() == message_id)
            .map(|s| s.message.clone())
    }

    /// All messages tapped under a stage label, oldest first.
    #[must_use]
    pub fn by_context(&self, context: &str) -> Vec<Message> {
        self.read_lock()
            .iter()
            .filter(|s| s.context == context)
            .map(|s| s.message.clone())
            .collect()
    }

    /// All messages observed within `[start, end]` (inclusive bounds).
    #[must_use]
    pub fn by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Message> {
        self.read_lock()
            .iter()
            .filter(|s| s.observed_at >= start && s.observed_at <= end)
            .map(|s| s.message.clone())
            .collect()
    }

    /// Every stored tap event, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<StoredMessage> {
        self.read_lock().iter().cloned().collect()
    }

    /// Drop every tap event for a message id.
    pub fn remove(&self, message_id: &str) {
        self.write_lock().retain(|s| s.message.id() != message_id);
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.write_lock().clear();
        tracing::info!("Message store cleared");
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, VecDeque<StoredMessage>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, VecDeque<StoredMessage>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
