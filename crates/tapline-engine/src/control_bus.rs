//! Command and status surface over running job executions.
//!
//! Every started run is registered here with its cancellation token and
//! task handle. Terminal records stick around for a retention window so
//! operators can query recent outcomes, then get swept lazily on access
//! or by the engine's reaper tick. There is one bus per engine, owned
//! and injected, never global.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tapline_types::error::{EngineError, Result};
use tapline_types::execution::{ExecutionRecord, JobStatus};

/// How long terminal records remain queryable.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60);

struct ExecutionEntry {
    record: ExecutionRecord,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    /// Set once the record is terminal.
    expires_at: Option<Instant>,
}

type Registry = Arc<Mutex<HashMap<String, ExecutionEntry>>>;

pub struct ControlBus {
    entries: Registry,
    retention: Duration,
}

impl Default for ControlBus {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl ControlBus {
    #[must_use]
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            retention,
        }
    }

    /// Register and spawn one run of `job_id`.
    ///
    /// The run is registered `Pending` and becomes `Running` when its
    /// task starts. `run` receives the run's cancellation token and must
    /// resolve to the terminal [`ExecutionRecord`]. If a stop arrives first, the record
    /// stays `Cancelled`; a late completion never overwrites a terminal
    /// status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the job already has an active
    /// (non-terminal) run.
    pub fn start_job<F, Fut>(&self, job_id: &str, run: F) -> Result<CancellationToken>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ExecutionRecord> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        {
            let mut entries = lock(&self.entries);
            sweep(&mut entries);
            if let Some(existing) = entries.get(job_id) {
                if !existing.record.status.is_terminal() {
                    return Err(EngineError::Config(format!(
                        "job '{job_id}' already has an active run"
                    )));
                }
            }

            entries.insert(
                job_id.to_string(),
                ExecutionEntry {
                    record: ExecutionRecord::new(job_id),
                    cancel: cancel.clone(),
                    handle: None,
                    expires_at: None,
                },
            );
        }
        tracing::info!(job_id, "Run registered");

        let fut = run(cancel.clone());
        let registry = Arc::clone(&self.entries);
        let retention = self.retention;
        let owned_id = job_id.to_string();
        let handle = tokio::spawn(async move {
            {
                let mut entries = lock(&registry);
                if let Some(entry) = entries.get_mut(&owned_id) {
                    // Pending becomes Running once the task actually begins;
                    // a stop that raced in first stays terminal.
                    if !entry.record.status.is_terminal() {
                        entry.record.start();
                    }
                }
            }
            let final_record = fut.await;
            let mut entries = lock(&registry);
            if let Some(entry) = entries.get_mut(&owned_id) {
                if entry.record.status.is_terminal() {
                    tracing::debug!(job_id = %owned_id, "Late completion ignored, run already terminal");
                } else {
                    tracing::info!(job_id = %owned_id, status = %final_record.status, "Run finished");
                    entry.record = final_record;
                    entry.expires_at = Some(Instant::now() + retention);
                }
            }
        });
        if let Some(entry) = lock(&self.entries).get_mut(job_id) {
            entry.handle = Some(handle);
        }
        Ok(cancel)
    }

    /// Cancel an active run. False when the job is unknown or already
    /// terminal.
    pub fn stop_job(&self, job_id: &str) -> bool {
        let mut entries = lock(&self.entries);
        let Some(entry) = entries.get_mut(job_id) else {
            return false;
        };
        if entry.record.status.is_terminal() {
            return false;
        }

        tracing::info!(job_id, "Stopping run");
        entry.cancel.cancel();
        entry.record.cancel();
        entry.expires_at = Some(Instant::now() + self.retention);
        true
    }

    /// Pause is not a capability of this engine's executions.
    ///
    /// # Errors
    ///
    /// Always [`EngineError::Unsupported`].
    pub fn pause_job(&self, job_id: &str) -> Result<()> {
        Err(EngineError::Unsupported(format!(
            "pause is not supported (job '{job_id}')"
        )))
    }

    /// See [`ControlBus::pause_job`].
    ///
    /// # Errors
    ///
    /// Always [`EngineError::Unsupported`].
    pub fn resume_job(&self, job_id: &str) -> Result<()> {
        Err(EngineError::Unsupported(format!(
            "resume is not supported (job '{job_id}')"
        )))
    }

    /// Status of the most recent known run. None = unknown or purged.
    #[must_use]
    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        let mut entries = lock(&self.entries);
        sweep(&mut entries);
        entries.get(job_id).map(|e| e.record.status)
    }

    /// Full record of the most recent known run.
    #[must_use]
    pub fn record(&self, job_id: &str) -> Option<ExecutionRecord> {
        let mut entries = lock(&self.entries);
        sweep(&mut entries);
        entries.get(job_id).map(|e| e.record.clone())
    }

    /// Ids of all runs that have not reached a terminal state.
    #[must_use]
    pub fn active_jobs(&self) -> Vec<String> {
        lock(&self.entries)
            .iter()
            .filter(|(_, e)| !e.record.status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Every retained record, active and terminal.
    #[must_use]
    pub fn all_records(&self) -> Vec<ExecutionRecord> {
        let mut entries = lock(&self.entries);
        sweep(&mut entries);
        entries.values().map(|e| e.record.clone()).collect()
    }

    /// Drop all terminal entries immediately, ignoring retention.
    /// Returns how many were removed.
    pub fn cleanup_finished(&self) -> usize {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|_, e| !e.record.status.is_terminal());
        before - entries.len()
    }

    /// Drop terminal entries whose retention has elapsed. The engine's
    /// reaper calls this on a timer; queries also sweep on access.
    pub fn reap_expired(&self) {
        sweep(&mut lock(&self.entries));
    }

    /// Cancel every active run and wait for their tasks to settle.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = {
            let mut entries = lock(&self.entries);
            let now = Instant::now();
            let mut handles = Vec::new();
            for (id, entry) in entries.iter_mut() {
                if !entry.record.status.is_terminal() {
                    entry.cancel.cancel();
                    entry.record.cancel();
                    entry.expires_at = Some(now + self.retention);
                }
                if let Some(handle) = entry.handle.take() {
                    handles.push((id.clone(), handle));
                }
            }
            handles
        };

        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                tracing::warn!(job_id, error = %e, "Run task did not settle cleanly");
            }
        }
        tracing::info!("Control bus shut down");
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<String, ExecutionEntry>> {
    registry
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn sweep(entries: &mut HashMap<String, ExecutionEntry>) {
    let now = Instant::now();
    entries.retain(|_, e| e.expires_at.is_none_or(|at| at > now));
}
