use std::path::Path;

use anyhow::{Context, Result};

/// Execute the `dlq` command: list dead-lettered messages on disk.
pub fn execute(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read dead-letter directory: {}", dir.display()))?;

    let mut paths: Vec<_> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("failed_") && name.ends_with(".json"))
        })
        .collect();
    paths.sort();

    if paths.is_empty() {
        println!("No dead letters in {}", dir.display());
        return Ok(());
    }

    for path in &paths {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record: serde_json::Value = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        let message_id = record["message_id"].as_str().unwrap_or("<unknown>");
        let timestamp = record["timestamp"].as_str().unwrap_or("<unknown>");
        // Dead-letter records carry the failure reason in the context field.
        let reason = record["context"].as_str().unwrap_or("<unknown>");

        println!("{message_id}  {timestamp}");
        println!("  reason: {reason}");
        if let Some(job_id) = record["headers"]["job_id"].as_str() {
            println!("  job:    {job_id}");
        }
    }
    println!("\n{} dead letter(s)", paths.len());
    Ok(())
}
