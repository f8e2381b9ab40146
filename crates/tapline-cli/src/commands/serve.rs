use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use tapline_engine::EngineConfig;

/// Execute the `serve` command: install schedules and run until Ctrl-C.
pub async fn execute(
    definitions: &Path,
    dead_letter_dir: Option<PathBuf>,
    message_dir: Option<PathBuf>,
) -> Result<()> {
    let bundle = super::load_bundle(definitions)?;
    let config = EngineConfig {
        dead_letter_dir,
        message_dir,
        ..EngineConfig::default()
    };
    let engine = super::build_engine(config, &bundle)?;

    let installed = engine.schedule_all();
    if installed == 0 {
        anyhow::bail!("no job in {} has a runnable schedule", definitions.display());
    }
    for job in &bundle.jobs {
        if let Some(next) = engine.scheduler().next_fire_time(&job.id) {
            println!("{:24} next fire {}", job.id, next.to_rfc3339());
        }
    }
    println!("\n{installed} schedule(s) active. Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Interrupt received");

    engine.shutdown().await;
    println!("Stopped.");
    Ok(())
}
