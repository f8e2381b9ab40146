//! Source and sink endpoints.
//!
//! An endpoint owns a connection lifecycle and exactly one transfer
//! operation: a source extracts records, a sink delivers a message.
//! Calling the other side's operation is a typed `Unsupported` error,
//! never a silent no-op.

pub mod relational;
pub mod rest;

pub use relational::{DatabaseEndpoint, RelationalSource, SourcePool, StaticSource};
pub use rest::RestSink;

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tapline_types::error::{EngineError, Result};
use tapline_types::message::Message;

/// One row of extracted data: column name to typed value, in select order.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Pause between disconnect and reconnect.
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// What the sink's target said about one delivery attempt.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// Any 2xx response.
    Accepted { status: u16 },
    /// 4xx (permanent) or 5xx (transient) response, body captured.
    Rejected { status: u16, body: String },
}

impl DeliveryOutcome {
    /// Collapse into a `Result` for the retry handler: rejections become
    /// [`EngineError::Http`], which carries the retry classification.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Http`] for rejected deliveries.
    pub fn into_result(self) -> Result<u16> {
        match self {
            Self::Accepted { status } => Ok(status),
            Self::Rejected { status, body } => Err(EngineError::Http { status, body }),
        }
    }
}

/// Reading side of an integration: relational extract.
#[async_trait]
pub trait SourceEndpoint: Send + Sync {
    fn name(&self) -> &str;

    /// Establish the connection. Idempotent.
    async fn connect(&self) -> Result<()>;

    /// Release the connection. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    async fn is_available(&self) -> bool;

    /// Run the query and wrap the rows in a document message.
    async fn extract(&self, query: &str, params: &[serde_json::Value]) -> Result<Message>;

    /// Sources do not deliver.
    async fn send(&self, _message: &Message) -> Result<()> {
        Err(EngineError::Unsupported(format!(
            "source endpoint '{}' cannot send",
            self.name()
        )))
    }

    /// Drop and re-establish the connection after a short pause.
    async fn reconnect(&self, cancel: &CancellationToken) -> Result<()> {
        self.disconnect().await?;
        tokio::select! {
            () = cancel.cancelled() => {
                return Err(EngineError::Cancelled("reconnect aborted".to_string()));
            }
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
        self.connect().await
    }
}

/// Writing side of an integration: HTTP delivery.
#[async_trait]
pub trait SinkEndpoint: Send + Sync {
    fn name(&self) -> &str;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;

    async fn is_available(&self) -> bool;

    /// Perform exactly one delivery attempt.
    async fn deliver(&self, message: &Message) -> Result<DeliveryOutcome>;

    /// Sinks do not extract.
    async fn extract(&self, _query: &str, _params: &[serde_json::Value]) -> Result<Message> {
        Err(EngineError::Unsupported(format!(
            "sink endpoint '{}' cannot extract",
            self.name()
        )))
    }
}
