use std::path::{Path, PathBuf};

use anyhow::Result;

use tapline_engine::EngineConfig;
use tapline_types::execution::JobStatus;

/// Execute the `run` command: load definitions, run one job, report.
pub async fn execute(
    definitions: &Path,
    job_id: &str,
    dead_letter_dir: Option<PathBuf>,
) -> Result<()> {
    let bundle = super::load_bundle(definitions)?;
    let config = EngineConfig {
        dead_letter_dir,
        ..EngineConfig::default()
    };
    let engine = super::build_engine(config, &bundle)?;

    let result = engine.execute_now(job_id).await;
    engine.shutdown().await;
    let outcome = result?;

    let record = &outcome.record;
    println!("Job '{}' finished: {}", job_id, record.status.as_str());
    println!("  Records:    {}", record.records_processed);
    if let Some(duration) = record.duration() {
        println!("  Duration:   {:.2}s", duration.num_milliseconds() as f64 / 1000.0);
    }
    println!("  Extract:    {}ms", outcome.metrics.extract.duration_ms);
    println!("  Transform:  {}ms", outcome.metrics.transform.duration_ms);
    println!("  Load:       {}ms", outcome.metrics.load.duration_ms);
    if let Some(error) = &record.error_message {
        println!("  Error:      {}", error);
    }

    match record.status {
        JobStatus::Success => Ok(()),
        status => anyhow::bail!("job '{}' ended with status {}", job_id, status.as_str()),
    }
}
