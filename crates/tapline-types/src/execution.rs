//! Per-run execution state and stage metrics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// State of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Terminal states never transition again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State machine instance for a single run: Pending → Running → terminal.
///
/// Created when a run starts and mutated only by its owning orchestrator
/// or control bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub records_processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// New record in `Pending`, not yet started.
    #[must_use]
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            status: JobStatus::Pending,
            started_at: None,
            ended_at: None,
            records_processed: 0,
            error_message: None,
        }
    }

    /// Enter `Running` and stamp the start time.
    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Terminate in `Success` with the processed record count.
    pub fn succeed(&mut self, records_processed: u64) {
        self.status = JobStatus::Success;
        self.records_processed = records_processed;
        self.ended_at = Some(Utc::now());
    }

    /// Terminate in `Failed` with an operator-facing reason.
    pub fn fail(&mut self, error_message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.error_message = Some(error_message.into());
        self.ended_at = Some(Utc::now());
    }

    /// Terminate in `Cancelled`.
    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.ended_at = Some(Utc::now());
    }

    /// Wall-clock duration of the run, when both bounds are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Timing and record count for one pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMetric {
    pub duration_ms: u64,
    pub records: u64,
}

/// Per-stage metrics for one run, collected regardless of outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub job_id: String,
    pub extract: StageMetric,
    pub transform: StageMetric,
    pub load: StageMetric,
}

impl ExecutionMetrics {
    #[must_use]
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Self::default()
        }
    }

    /// Sum of stage durations.
    #[must_use]
    pub fn total_duration_ms(&self) -> u64 {
        self.extract.duration_ms + self.transform.duration_ms + self.load.duration_ms
    }

    /// One-line operator summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "job={} extract={}ms/{}rec transform={}ms load={}ms total={}ms",
            self.job_id,
            self.extract.duration_ms,
            self.extract.records,
            self.transform.duration_ms,
            self.load.duration_ms,
            self.total_duration_ms(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_success_path() {
        let mut record = ExecutionRecord::new("job-1");
        assert_eq!(record.status, JobStatus::Pending);
        assert!(!record.status.is_terminal());

        record.start();
        assert_eq!(record.status, JobStatus::Running);
        assert!(record.started_at.is_some());

        record.succeed(250);
        assert_eq!(record.status, JobStatus::Success);
        assert_eq!(record.records_processed, 250);
        assert!(record.status.is_terminal());
        assert!(record.duration().is_some());
    }

    #[test]
    fn fail_captures_error_message() {
        let mut record = ExecutionRecord::new("job-1");
        record.start();
        record.fail("sink unreachable");
        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.error_message.as_deref(), Some("sink unreachable"));
    }

    #[test]
    fn cancel_before_start_has_no_duration() {
        let mut record = ExecutionRecord::new("job-1");
        record.cancel();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert!(record.duration().is_none());
    }

    #[test]
    fn status_serde_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }

    #[test]
    fn metrics_summary_totals() {
        let mut m = ExecutionMetrics::new("job-9");
        m.extract = StageMetric { duration_ms: 120, records: 40 };
        m.transform = StageMetric { duration_ms: 15, records: 40 };
        m.load = StageMetric { duration_ms: 300, records: 40 };
        assert_eq!(m.total_duration_ms(), 435);
        assert!(m.summary().contains("total=435ms"));
    }
}
