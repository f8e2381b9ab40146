//! Drives one job through Extract, Transform, Load.
//!
//! The orchestrator converts every failure into a terminal
//! [`ExecutionRecord`]; only an invalid job definition is rejected as an
//! error before any state transition. Stage timings and record counts
//! are collected regardless of outcome, and lifecycle events flow
//! through the wire tap.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use tapline_store::DeadLetterChannel;
use tapline_types::error::{EngineError, Result};
use tapline_types::execution::{ExecutionMetrics, ExecutionRecord, StageMetric};
use tapline_types::job::EtlJob;
use tapline_types::message::Message;

use crate::endpoint::{DatabaseEndpoint, RestSink, SinkEndpoint, SourceEndpoint, SourcePool};
use crate::pipeline::Pipeline;
use crate::retry::RetryHandler;
use crate::wiretap::WireTap;

/// Terminal record plus the metrics gathered on the way there.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub record: ExecutionRecord,
    pub metrics: ExecutionMetrics,
}

pub struct Orchestrator {
    sources: Arc<SourcePool>,
    tap: Arc<WireTap>,
    dead_letters: Arc<DeadLetterChannel>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        sources: Arc<SourcePool>,
        tap: Arc<WireTap>,
        dead_letters: Arc<DeadLetterChannel>,
    ) -> Self {
        Self { sources, tap, dead_letters }
    }

    /// Run the job to a terminal state.
    ///
    /// # Errors
    ///
    /// Only [`EngineError::Config`] for a statically invalid job. Every
    /// runtime failure is folded into the returned record instead.
    pub async fn execute(
        &self,
        job: &EtlJob,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        let errors = job.validation_errors();
        if !errors.is_empty() {
            return Err(EngineError::Config(format!(
                "job '{}': {}",
                job.id,
                errors.join("; ")
            )));
        }

        let mut record = ExecutionRecord::new(&job.id);
        let mut metrics = ExecutionMetrics::new(&job.id);

        if !job.enabled {
            tracing::warn!(job_id = %job.id, "Job disabled, skipping run");
            record.cancel();
            return Ok(ExecutionOutcome { record, metrics });
        }

        record.start();
        tracing::info!(job_id = %job.id, name = %job.name, "Job run starting");
        self.emit(job, "job-start", "orchestrator-start", &[]);

        // Extract
        let started = Instant::now();
        let extracted = match self.extract(job, cancel).await {
            Ok(message) => message,
            Err(e) => {
                metrics.extract.duration_ms = elapsed_ms(started);
                return Ok(self.terminal(job, record, metrics, e));
            }
        };
        let record_count = extracted
            .header("record_count")
            .and_then(|c| c.parse::<u64>().ok())
            .unwrap_or(0);
        metrics.extract = StageMetric { duration_ms: elapsed_ms(started), records: record_count };
        self.tap.intercept(&extracted, "orchestrator-extract");
        tracing::info!(job_id = %job.id, records = record_count, "Extract stage done");

        // Transform
        let started = Instant::now();
        let pipeline = Pipeline::for_job(&job.transform, Arc::clone(&self.tap));
        let transformed = match pipeline.process(extracted) {
            Ok(message) => message,
            Err(e) => {
                metrics.transform.duration_ms = elapsed_ms(started);
                return Ok(self.terminal(job, record, metrics, e));
            }
        };
        metrics.transform = StageMetric { duration_ms: elapsed_ms(started), records: record_count };
        self.tap.intercept(&transformed, "orchestrator-transform");
        tracing::info!(job_id = %job.id, "Transform stage done");

        // Load
        let started = Instant::now();
        let load_result = self.load(job, &transformed, cancel).await;
        metrics.load = StageMetric { duration_ms: elapsed_ms(started), records: record_count };

        match load_result {
            Ok(status) => {
                record.succeed(record_count);
                tracing::info!(job_id = %job.id, status, records = record_count, "Job run succeeded");
                self.emit(
                    job,
                    "job-success",
                    "orchestrator-success",
                    &[("record_count", record_count.to_string())],
                );
            }
            Err(e @ EngineError::Cancelled(_)) => {
                tracing::warn!(job_id = %job.id, "Job run cancelled during load");
                record.cancel();
                record.error_message = Some(e.to_string());
            }
            Err(e) => {
                let reason = e.to_string();
                self.dead_letters.send(&transformed, &reason);
                record.fail(&reason);
                tracing::error!(job_id = %job.id, error = %reason, "Job run failed to deliver");
                self.emit(
                    job,
                    "job-failure",
                    "orchestrator-failure",
                    &[("reason", reason)],
                );
            }
        }

        tracing::info!(job_id = %job.id, "{}", metrics.summary());
        Ok(ExecutionOutcome { record, metrics })
    }

    /// Extract with one reconnect-and-retry on a transient source error.
    async fn extract(&self, job: &EtlJob, cancel: &CancellationToken) -> Result<Message> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled("run cancelled before extract".to_string()));
        }
        let endpoint = self.sources.acquire(&job.source).await?;
        match Self::try_extract(&endpoint, job, cancel).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(job_id = %job.id, error = %e, "Extract failed, reconnecting source");
                endpoint.reconnect(cancel).await?;
                Self::try_extract(&endpoint, job, cancel).await
            }
            other => other,
        }
    }

    async fn try_extract(
        endpoint: &DatabaseEndpoint,
        job: &EtlJob,
        cancel: &CancellationToken,
    ) -> Result<Message> {
        tokio::select! {
            () = cancel.cancelled() => {
                Err(EngineError::Cancelled("run cancelled during extract".to_string()))
            }
            result = endpoint.extract(&job.query, &job.query_params) => result,
        }
    }

    async fn load(
        &self,
        job: &EtlJob,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<u16> {
        let sink = RestSink::new(job.target.clone())?;
        let handler = RetryHandler::from_policy(&job.target.retry);
        let sink_ref = &sink;
        handler
            .execute(cancel, move || async move {
                sink_ref.deliver(message).await?.into_result()
            })
            .await
    }

    /// Fold an extract/transform/cancel failure into the record.
    fn terminal(
        &self,
        job: &EtlJob,
        mut record: ExecutionRecord,
        metrics: ExecutionMetrics,
        error: EngineError,
    ) -> ExecutionOutcome {
        match &error {
            EngineError::Cancelled(_) => {
                tracing::warn!(job_id = %job.id, "Job run cancelled");
                record.cancel();
                record.error_message = Some(error.to_string());
            }
            _ => {
                let reason = error.to_string();
                tracing::error!(job_id = %job.id, error = %reason, "Job run failed");
                record.fail(&reason);
                self.emit(job, "job-error", "orchestrator-error", &[("error", reason)]);
            }
        }
        ExecutionOutcome { record, metrics }
    }

    fn emit(&self, job: &EtlJob, action: &str, context: &str, extra: &[(&str, String)]) {
        let mut event = Message::event();
        event.set_header("job_id", job.id.clone());
        event.set_header("job_name", job.name.clone());
        event.set_header("action", action);
        for (key, value) in extra {
            event.set_header(*key, value.clone());
        }
        self.tap.intercept(&event, context);
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::relational::{RelationalSource, SourceFactory, StaticSource};
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tapline_store::MessageStore;
    use tapline_types::api::{ApiConfig, AuthKind, HttpMethod, RetryPolicy};
    use tapline_types::execution::JobStatus;
    use tapline_types::source::{SourceConfig, SourceKind};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Hands out pre-built sources by name.
    struct FixtureFactory {
        sources: Mutex<BTreeMap<String, Arc<StaticSource>>>,
    }

    impl FixtureFactory {
        fn with(name: &str, source: StaticSource) -> Arc<Self> {
            let mut sources = BTreeMap::new();
            sources.insert(name.to_string(), Arc::new(source));
            Arc::new(Self { sources: Mutex::new(sources) })
        }
    }

    impl SourceFactory for FixtureFactory {
        fn create(&self, config: &SourceConfig) -> Result<Arc<dyn RelationalSource>> {
            let sources = self.sources.lock().unwrap();
            sources
                .get(&config.name)
                .cloned()
                .map(|s| s as Arc<dyn RelationalSource>)
                .ok_or_else(|| EngineError::Config(format!("no fixture for '{}'", config.name)))
        }
    }

    struct Fixture {
        orchestrator: Orchestrator,
        store: Arc<MessageStore>,
        dead_letters: Arc<DeadLetterChannel>,
    }

    fn fixture(rows: serde_json::Value) -> Fixture {
        let store = Arc::new(MessageStore::in_memory(1000));
        let tap = Arc::new(WireTap::new(Arc::clone(&store)));
        let dead_letters = Arc::new(DeadLetterChannel::in_memory());
        let factory = FixtureFactory::with("src", StaticSource::from_json(rows));
        let orchestrator = Orchestrator::new(
            Arc::new(SourcePool::new(factory)),
            tap,
            Arc::clone(&dead_letters),
        );
        Fixture { orchestrator, store, dead_letters }
    }

    fn job(base_url: &str, retry: RetryPolicy) -> EtlJob {
        EtlJob {
            id: "orders-sync".into(),
            name: "Orders sync".into(),
            description: String::new(),
            enabled: true,
            source: SourceConfig {
                name: "src".into(),
                kind: SourceKind::Postgres,
                host: "localhost".into(),
                port: 5432,
                database: "db".into(),
                username: "u".into(),
                password: "p".into(),
                properties: BTreeMap::new(),
            },
            query: "SELECT * FROM orders".into(),
            query_params: Vec::new(),
            target: ApiConfig {
                name: "crm".into(),
                base_url: base_url.into(),
                path: "orders".into(),
                method: HttpMethod::Post,
                auth: AuthKind::None,
                headers: BTreeMap::new(),
                timeout_ms: 2_000,
                retry,
            },
            transform: Default::default(),
            schedule: None,
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy { max_retries: 0, base_delay_ms: 1, exponential_backoff: false }
    }

    #[tokio::test]
    async fn full_run_succeeds_with_metrics_and_events() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(json!([{"id": 1}, {"id": 2}]));
        let cancel = CancellationToken::new();
        let outcome = fx
            .orchestrator
            .execute(&job(&server.uri(), no_retry()), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.record.status, JobStatus::Success);
        assert_eq!(outcome.record.records_processed, 2);
        assert_eq!(outcome.metrics.extract.records, 2);

        assert_eq!(fx.store.by_context("orchestrator-start").len(), 1);
        assert_eq!(fx.store.by_context("orchestrator-extract").len(), 1);
        assert_eq!(fx.store.by_context("orchestrator-transform").len(), 1);
        let success = &fx.store.by_context("orchestrator-success")[0];
        assert_eq!(success.header("action"), Some("job-success"));
        assert_eq!(success.header("record_count"), Some("2"));
        assert!(fx.dead_letters.is_empty());
    }

    #[tokio::test]
    async fn invalid_job_is_rejected_without_state() {
        let fx = fixture(json!([]));
        let mut bad = job("http://localhost", no_retry());
        bad.query = String::new();

        let err = fx
            .orchestrator
            .execute(&bad, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(fx.store.is_empty(), "no events for a rejected job");
    }

    #[tokio::test]
    async fn disabled_job_is_cancelled_without_stage_calls() {
        let fx = fixture(json!([{"id": 1}]));
        let mut disabled = job("http://localhost", no_retry());
        disabled.enabled = false;

        let outcome = fx
            .orchestrator
            .execute(&disabled, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.record.status, JobStatus::Cancelled);
        assert_eq!(outcome.metrics.total_duration_ms(), 0);
        assert!(fx.store.is_empty(), "no tap events, no stage calls");
    }

    #[tokio::test]
    async fn transient_extract_recovers_after_one_reconnect() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MessageStore::in_memory(1000));
        let tap = Arc::new(WireTap::new(Arc::clone(&store)));
        let dead_letters = Arc::new(DeadLetterChannel::in_memory());
        let source = StaticSource::from_json(json!([{"id": 1}])).failing_first(1);
        let factory = FixtureFactory::with("src", source);
        let orchestrator = Orchestrator::new(
            Arc::new(SourcePool::new(factory)),
            tap,
            Arc::clone(&dead_letters),
        );

        let outcome = orchestrator
            .execute(&job(&server.uri(), no_retry()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.record.status, JobStatus::Success);
        assert_eq!(outcome.record.records_processed, 1);
        assert!(store.by_context("orchestrator-error").is_empty());
    }

    #[tokio::test]
    async fn extract_failure_emits_job_error() {
        let fx = fixture(json!([]));
        let mut missing_source = job("http://localhost", no_retry());
        missing_source.source.name = "unknown".into();

        let outcome = fx
            .orchestrator
            .execute(&missing_source, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.record.status, JobStatus::Failed);

        let errors = fx.store.by_context("orchestrator-error");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].header("action"), Some("job-error"));
        assert!(fx.store.by_context("orchestrator-extract").is_empty());
        assert!(fx.dead_letters.is_empty(), "extract failures do not dead-letter");
    }

    #[tokio::test]
    async fn permanent_rejection_dead_letters_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
            .expect(1)
            .mount(&server)
            .await;

        let fx = fixture(json!([{"id": 1}]));
        let outcome = fx
            .orchestrator
            .execute(
                &job(&server.uri(), RetryPolicy { max_retries: 3, ..no_retry() }),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.record.status, JobStatus::Failed);
        assert_eq!(fx.dead_letters.len(), 1, "exactly one dead letter, no retries");
        let failure = &fx.dead_letters.failures()[0];
        assert!(failure.reason.contains("404"), "status in reason: {}", failure.reason);

        let failures = fx.store.by_context("orchestrator-failure");
        assert_eq!(failures[0].header("action"), Some("job-failure"));
    }

    #[tokio::test]
    async fn transient_failures_then_success_within_budget() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let fx = fixture(json!([{"id": 1}]));
        let retry = RetryPolicy { max_retries: 3, base_delay_ms: 10, exponential_backoff: true };
        let outcome = fx
            .orchestrator
            .execute(&job(&server.uri(), retry), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.record.status, JobStatus::Success);
        assert!(fx.dead_letters.is_empty());
    }

    #[tokio::test]
    async fn cancellation_before_extract_yields_cancelled() {
        let fx = fixture(json!([{"id": 1}]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = fx
            .orchestrator
            .execute(&job("http://localhost", no_retry()), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.record.status, JobStatus::Cancelled);
        assert!(fx.dead_letters.is_empty(), "cancellation is not a delivery failure");
    }
}
