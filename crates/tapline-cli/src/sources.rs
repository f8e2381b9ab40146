//! Source backend used by the CLI.
//!
//! Real database drivers live behind [`RelationalSource`]; the binary
//! ships with a file-backed implementation so jobs can run against row
//! fixtures. A source whose `properties` carry a `rows_file` entry
//! serves the rows from that JSON file (an array of objects); without
//! one it serves no rows.

use std::sync::Arc;

use tapline_engine::endpoint::relational::{RelationalSource, SourceFactory, StaticSource};
use tapline_types::error::{EngineError, Result};
use tapline_types::source::SourceConfig;

pub struct FileSourceFactory;

impl SourceFactory for FileSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn RelationalSource>> {
        if !config.is_valid() {
            return Err(EngineError::Config(format!(
                "source '{}': {}",
                config.name,
                config.validation_errors().join("; ")
            )));
        }
        match config.properties.get("rows_file") {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| EngineError::Store(format!("read rows file {path}: {e}")))?;
                let rows: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| EngineError::Config(format!("parse rows file {path}: {e}")))?;
                tracing::debug!(source = %config.name, rows_file = %path, "File-backed source");
                Ok(Arc::new(StaticSource::from_json(rows)))
            }
            None => Ok(Arc::new(StaticSource::new(Vec::new()))),
        }
    }
}
