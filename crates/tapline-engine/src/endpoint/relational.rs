//! Relational source endpoint and connection pool.
//!
//! The engine never talks to a database driver directly. It goes through
//! the [`RelationalSource`] capability, which hands back rows already
//! normalized to JSON values. [`StaticSource`] is the in-memory
//! implementation used for wiring and tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use tapline_types::error::{EngineError, Result};
use tapline_types::message::Message;
use tapline_types::source::SourceConfig;

use super::{Row, SourceEndpoint};

/// Opaque row-fetching capability over one relational system.
///
/// Implementations own driver specifics and must return rows with
/// date/time, decimal, binary, and null values rendered as plain JSON,
/// never driver-native types.
#[async_trait]
pub trait RelationalSource: Send + Sync {
    /// Open the underlying connection. Idempotent.
    async fn open(&self) -> Result<()>;

    /// Close the underlying connection. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Cheap liveness probe.
    async fn ping(&self) -> bool;

    /// Run the query with positional parameters.
    async fn fetch(&self, query: &str, params: &[Value]) -> Result<Vec<Row>>;
}

/// Builds a [`RelationalSource`] for a connection descriptor.
pub trait SourceFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for descriptors the factory cannot
    /// serve.
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn RelationalSource>>;
}

/// [`SourceEndpoint`] over a [`RelationalSource`].
pub struct DatabaseEndpoint {
    config: SourceConfig,
    source: Arc<dyn RelationalSource>,
}

impl DatabaseEndpoint {
    #[must_use]
    pub fn new(config: SourceConfig, source: Arc<dyn RelationalSource>) -> Self {
        Self { config, source }
    }

    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }
}

#[async_trait]
impl SourceEndpoint for DatabaseEndpoint {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<()> {
        tracing::debug!(source = %self.config.name, url = %self.config.url(), "Connecting source");
        self.source.open().await
    }

    async fn disconnect(&self) -> Result<()> {
        tracing::debug!(source = %self.config.name, "Disconnecting source");
        self.source.close().await
    }

    async fn is_available(&self) -> bool {
        self.source.ping().await
    }

    async fn extract(&self, query: &str, params: &[Value]) -> Result<Message> {
        tracing::info!(source = %self.config.name, "Extracting");
        let rows = self.source.fetch(query, params).await?;
        let count = rows.len();

        let payload = Value::Array(rows.into_iter().map(Value::Object).collect());
        let mut message = Message::document(payload);
        message.set_header("source", self.config.name.clone());
        message.set_header("query", query.to_string());
        message.set_header("record_count", count.to_string());

        tracing::info!(source = %self.config.name, records = count, "Extract complete");
        Ok(message)
    }
}

/// One shared, lazily-connected endpoint per named source.
///
/// Connections live until [`SourcePool::close_all`]; a failed create is
/// not cached, so a later call retries.
pub struct SourcePool {
    factory: Arc<dyn SourceFactory>,
    endpoints: Mutex<HashMap<String, Arc<DatabaseEndpoint>>>,
}

impl SourcePool {
    #[must_use]
    pub fn new(factory: Arc<dyn SourceFactory>) -> Self {
        Self { factory, endpoints: Mutex::new(HashMap::new()) }
    }

    /// Fetch or create the endpoint for a source descriptor.
    ///
    /// # Errors
    ///
    /// Returns the factory's or the connect error; nothing is cached on
    /// failure.
    pub async fn acquire(&self, config: &SourceConfig) -> Result<Arc<DatabaseEndpoint>> {
        if let Some(existing) = self.lock().get(&config.name).cloned() {
            return Ok(existing);
        }

        let source = self.factory.create(config)?;
        let endpoint = Arc::new(DatabaseEndpoint::new(config.clone(), source));
        endpoint.connect().await?;

        // A concurrent acquire may have won the race; keep the first one.
        let mut endpoints = self.lock();
        let entry = endpoints
            .entry(config.name.clone())
            .or_insert_with(|| Arc::clone(&endpoint));
        Ok(Arc::clone(entry))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Disconnect every pooled endpoint, logging failures instead of
    /// propagating them.
    pub async fn close_all(&self) {
        let endpoints: Vec<Arc<DatabaseEndpoint>> = self.lock().drain().map(|(_, e)| e).collect();
        for endpoint in endpoints {
            if let Err(e) = endpoint.disconnect().await {
                tracing::warn!(source = endpoint.name(), error = %e, "Source release failed");
            }
        }
        tracing::info!("Source pool closed");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<DatabaseEndpoint>>> {
        self.endpoints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// In-memory source: returns a fixed row set and records every query.
pub struct StaticSource {
    rows: Vec<Row>,
    open: Mutex<bool>,
    queries: Mutex<Vec<(String, Vec<Value>)>>,
    failures_remaining: Mutex<u32>,
}

impl StaticSource {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows,
            open: Mutex::new(false),
            queries: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(0),
        }
    }

    /// Rows built from a JSON array literal. Panics on non-object rows,
    /// acceptable for test fixtures.
    #[must_use]
    pub fn from_json(rows: Value) -> Self {
        let rows = match rows {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => row,
                    other => panic!("StaticSource rows must be objects, got {other}"),
                })
                .collect(),
            other => panic!("StaticSource rows must be an array, got {other}"),
        };
        Self::new(rows)
    }

    /// Make the next `n` fetches fail transiently before succeeding.
    #[must_use]
    pub fn failing_first(mut self, n: u32) -> Self {
        self.failures_remaining = Mutex::new(n);
        self
    }

    /// Queries seen so far, in call order.
    #[must_use]
    pub fn queries(&self) -> Vec<(String, Vec<Value>)> {
        self.queries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn guard<'a, T>(&self, m: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RelationalSource for StaticSource {
    async fn open(&self) -> Result<()> {
        *self.guard(&self.open) = true;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.guard(&self.open) = false;
        Ok(())
    }

    async fn ping(&self) -> bool {
        *self.guard(&self.open)
    }

    async fn fetch(&self, query: &str, params: &[Value]) -> Result<Vec<Row>> {
        if !*self.guard(&self.open) {
            return Err(EngineError::TransientIo("source not connected".to_string()));
        }
        {
            let mut failures = self.guard(&self.failures_remaining);
            if *failures > 0 {
                *failures -= 1;
                return Err(EngineError::TransientIo("simulated fetch failure".to_string()));
            }
        }
        self.guard(&self.queries)
            .push((query.to_string(), params.to_vec()));
        Ok(self.rows.clone())
    }
}

/// Factory producing empty [`StaticSource`]s, enough to wire a pool in
/// environments without a driver backend.
pub struct StaticSourceFactory;

impl SourceFactory for StaticSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn RelationalSource>> {
        if !config.is_valid() {
            return Err(EngineError::Config(format!(
                "source '{}': {}",
                config.name,
                config.validation_errors().join("; ")
            )));
        }
        Ok(Arc::new(StaticSource::new(Vec::new())))
    }
}
