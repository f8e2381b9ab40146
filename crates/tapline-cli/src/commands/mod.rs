pub mod check;
pub mod dlq;
pub mod run;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use tapline_engine::definitions::{DefinitionBundle, JsonDefinitionStore};
use tapline_engine::{Engine, EngineConfig};

use crate::sources::FileSourceFactory;

/// Load the definitions file shared by every subcommand.
pub(crate) fn load_bundle(path: &Path) -> Result<DefinitionBundle> {
    JsonDefinitionStore::new(path)
        .load_bundle()
        .with_context(|| format!("Failed to load definitions: {}", path.display()))
}

/// Build an engine over the file-backed source factory and register
/// every job from the bundle.
pub(crate) fn build_engine(config: EngineConfig, bundle: &DefinitionBundle) -> Result<Engine> {
    let engine =
        Engine::new(config, Arc::new(FileSourceFactory)).context("Failed to start engine")?;
    engine.register_jobs(bundle.jobs.iter().cloned());
    Ok(engine)
}
