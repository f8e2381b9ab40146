//! Message history and dead-letter persistence for the Tapline engine.
//!
//! Provides the [`MessageStore`] (bounded in-memory history of tapped
//! messages with an optional durable JSON log) and the
//! [`DeadLetterChannel`] (undeliverable-message holding area). Both are
//! shared across concurrent job runs and serialize writes behind a
//! read/write lock.

pub mod dead_letter;
pub mod message_store;
mod record;

pub use dead_letter::{DeadLetterChannel, FailedMessage};
pub use message_store::{MessageStore, StoredMessage};
