//! Engine facade: wires the store stack, control bus, scheduler, and
//! orchestrator together and owns the shutdown order.
//!
//! All services are constructed here and injected; nothing in the engine
//! is a process-wide singleton, so two engines can coexist in one
//! process (tests rely on this).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tapline_store::{DeadLetterChannel, MessageStore};
use tapline_types::error::{EngineError, Result};
use tapline_types::execution::ExecutionRecord;
use tapline_types::job::EtlJob;

use crate::control_bus::{ControlBus, DEFAULT_RETENTION};
use crate::endpoint::relational::SourceFactory;
use crate::endpoint::SourcePool;
use crate::orchestrator::{ExecutionOutcome, Orchestrator};
use crate::scheduler::{JobRunner, JobScheduler};
use crate::wiretap::WireTap;

const REAPER_TICK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// In-memory message store capacity (tap events).
    pub store_capacity: usize,
    /// Mirror tapped messages to JSON files under this directory.
    pub message_dir: Option<PathBuf>,
    /// Persist dead letters to JSON files under this directory.
    pub dead_letter_dir: Option<PathBuf>,
    /// How long terminal execution records stay queryable.
    pub record_retention: Duration,
    pub tap_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_capacity: 1_000,
            message_dir: None,
            dead_letter_dir: None,
            record_retention: DEFAULT_RETENTION,
            tap_enabled: true,
        }
    }
}

type JobRegistry = Arc<Mutex<HashMap<String, EtlJob>>>;

/// Executes scheduler fires through the control bus.
struct BusRunner {
    jobs: JobRegistry,
    orchestrator: Arc<Orchestrator>,
    control_bus: Arc<ControlBus>,
}

#[async_trait::async_trait]
impl JobRunner for BusRunner {
    async fn run_job(&self, job_id: &str) -> bool {
        let job = {
            let jobs = lock_jobs(&self.jobs);
            jobs.get(job_id).cloned()
        };
        let Some(job) = job else {
            return false;
        };

        let orchestrator = Arc::clone(&self.orchestrator);
        let result = self.control_bus.start_job(job_id, move |cancel| async move {
            run_to_record(&orchestrator, &job, &cancel).await
        });
        if let Err(e) = result {
            // Overlapping fire while the previous run is still going.
            tracing::warn!(job_id, error = %e, "Scheduled fire not started");
        }
        true
    }
}

/// Run a job and fold even a pre-run rejection into a terminal record.
async fn run_to_record(
    orchestrator: &Orchestrator,
    job: &EtlJob,
    cancel: &CancellationToken,
) -> ExecutionRecord {
    match orchestrator.execute(job, cancel).await {
        Ok(outcome) => outcome.record,
        Err(e) => {
            let mut record = ExecutionRecord::new(&job.id);
            record.fail(e.to_string());
            record
        }
    }
}

pub struct Engine {
    store: Arc<MessageStore>,
    dead_letters: Arc<DeadLetterChannel>,
    sources: Arc<SourcePool>,
    orchestrator: Arc<Orchestrator>,
    control_bus: Arc<ControlBus>,
    scheduler: JobScheduler,
    jobs: JobRegistry,
    reaper: JoinHandle<()>,
}

impl Engine {
    /// Build a fully wired engine. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Store`] when a durable directory cannot be
    /// created.
    pub fn new(config: EngineConfig, factory: Arc<dyn SourceFactory>) -> Result<Self> {
        let store = Arc::new(match &config.message_dir {
            Some(dir) => MessageStore::durable(config.store_capacity, dir)?,
            None => MessageStore::in_memory(config.store_capacity),
        });
        let dead_letters = Arc::new(match &config.dead_letter_dir {
            Some(dir) => DeadLetterChannel::durable(dir)?,
            None => DeadLetterChannel::in_memory(),
        });
        let tap = Arc::new(WireTap::with_enabled(Arc::clone(&store), config.tap_enabled));
        let sources = Arc::new(SourcePool::new(factory));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&sources),
            tap,
            Arc::clone(&dead_letters),
        ));
        let control_bus = Arc::new(ControlBus::new(config.record_retention));
        let jobs: JobRegistry = Arc::new(Mutex::new(HashMap::new()));

        let runner = Arc::new(BusRunner {
            jobs: Arc::clone(&jobs),
            orchestrator: Arc::clone(&orchestrator),
            control_bus: Arc::clone(&control_bus),
        });
        let scheduler = JobScheduler::new(runner);

        let reaper_bus = Arc::clone(&control_bus);
        let reaper = tokio::spawn(async move {
            let mut tick = tokio::time::interval(REAPER_TICK);
            loop {
                tick.tick().await;
                reaper_bus.reap_expired();
            }
        });

        tracing::info!("Engine initialized");
        Ok(Self {
            store,
            dead_letters,
            sources,
            orchestrator,
            control_bus,
            scheduler,
            jobs,
            reaper,
        })
    }

    /// Make a job known to the engine, replacing any same-id definition.
    pub fn register_job(&self, job: EtlJob) {
        tracing::debug!(job_id = %job.id, "Job registered");
        lock_jobs(&self.jobs).insert(job.id.clone(), job);
    }

    pub fn register_jobs(&self, jobs: impl IntoIterator<Item = EtlJob>) {
        for job in jobs {
            self.register_job(job);
        }
    }

    #[must_use]
    pub fn job(&self, job_id: &str) -> Option<EtlJob> {
        lock_jobs(&self.jobs).get(job_id).cloned()
    }

    /// Run one registered job to completion, bypassing the scheduler but
    /// tracked on the control bus like any other run.
    ///
    /// # Errors
    ///
    /// Unknown id, invalid definition, or an already-active run.
    pub async fn execute_now(&self, job_id: &str) -> Result<ExecutionOutcome> {
        let job = self
            .job(job_id)
            .ok_or_else(|| EngineError::Config(format!("unknown job '{job_id}'")))?;

        let errors = job.validation_errors();
        if !errors.is_empty() {
            return Err(EngineError::Config(format!(
                "job '{job_id}': {}",
                errors.join("; ")
            )));
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        let orchestrator = Arc::clone(&self.orchestrator);
        self.control_bus.start_job(job_id, move |cancel| async move {
            let outcome = match orchestrator.execute(&job, &cancel).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let mut record = ExecutionRecord::new(&job.id);
                    record.fail(e.to_string());
                    ExecutionOutcome {
                        record,
                        metrics: tapline_types::execution::ExecutionMetrics::new(&job.id),
                    }
                }
            };
            let record = outcome.record.clone();
            let _ = tx.send(outcome);
            record
        })?;

        rx.await
            .map_err(|_| EngineError::Internal("run task dropped before completing".to_string()))
    }

    /// Install triggers for every registered job with a runnable
    /// schedule. Returns how many were installed.
    pub fn schedule_all(&self) -> usize {
        let jobs: Vec<EtlJob> = lock_jobs(&self.jobs).values().cloned().collect();
        let installed = self.scheduler.schedule_all(&jobs);
        tracing::info!(installed, total = jobs.len(), "Schedules installed");
        installed
    }

    #[must_use]
    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn control_bus(&self) -> &Arc<ControlBus> {
        &self.control_bus
    }

    #[must_use]
    pub fn message_store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    #[must_use]
    pub fn dead_letters(&self) -> &Arc<DeadLetterChannel> {
        &self.dead_letters
    }

    /// Stop triggers, cancel running executions, release pooled
    /// connections. Best-effort in that order; release errors are logged
    /// by the pool, never propagated.
    pub async fn shutdown(&self) {
        tracing::info!("Engine shutting down");
        self.scheduler.shutdown();
        self.control_bus.shutdown().await;
        self.sources.close_all().await;
        self.reaper.abort();
        tracing::info!("Engine shut down");
    }
}

fn lock_jobs(jobs: &JobRegistry) -> std::sync::MutexGuard<'_, HashMap<String, EtlJob>> {
    jobs.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
