//! Holding area for messages that could not be delivered.
//!
//! Entries are append-only and never mutated; reprocessing is an
//! external decision, this component performs no automatic replay.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tapline_types::error::{EngineError, Result};
use tapline_types::message::Message;

use crate::record::{file_sequence, file_timestamp, DurableRecord};

/// One undeliverable message plus why and when it failed.
#[derive(Debug, Clone)]
pub struct FailedMessage {
    pub message: Message,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Dead letter channel with optional per-failure durable files.
pub struct DeadLetterChannel {
    failures: RwLock<Vec<FailedMessage>>,
    durable_dir: Option<PathBuf>,
}

impl DeadLetterChannel {
    /// In-memory only channel.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            failures: RwLock::new(Vec::new()),
            durable_dir: None,
        }
    }

    /// Channel that also writes one JSON file per failure under `dir`.
    ///
    /// Files are named by message id, timestamp, and a process-wide
    /// sequence so repeated failures of the same message never collide
    /// or overwrite, even within one millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] if the directory cannot be created.
    pub fn durable(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Store(format!("create {}: {e}", dir.display())))?;
        tracing::info!(dir = %dir.display(), "Dead letter channel initialized");
        Ok(Self {
            failures: RwLock::new(Vec::new()),
            durable_dir: Some(dir),
        })
    }

    /// Record an undeliverable message with its failure reason.
    pub fn send(&self, message: &Message, reason: impl Into<String>) {
        let reason = reason.into();
        let failed_at = Utc::now();
        tracing::warn!(
            message_id = message.id(),
            reason = %reason,
            "Message sent to dead letter channel"
        );

        if let Some(dir) = &self.durable_dir {
            let filename = format!(
                "failed_{}_{}_{}.json",
                message.id(),
                file_timestamp(failed_at),
                file_sequence()
            );
            let record = DurableRecord::new(message, &reason, failed_at);
            if let Err(e) = record.write_to(&dir.join(filename)) {
                tracing::error!(message_id = message.id(), error = %e, "Dead letter write failed");
            }
        }

        self.write_lock().push(FailedMessage {
            message: message.clone(),
            reason,
            failed_at,
        });
    }

    /// Snapshot of all recorded failures.
    #[must_use]
    pub fn failures(&self) -> Vec<FailedMessage> {
        self.read_lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the in-memory list. Durable files are left untouched.
    pub fn clear(&self) {
        self.write_lock().clear();
        tracing::info!("Dead letter channel cleared");
    }

    fn read_lock(&self) -> std::sync::RwLockReadGuard<'_, Vec<FailedMessage>> {
        self.failures
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, Vec<FailedMessage>> {
        self.failures
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
