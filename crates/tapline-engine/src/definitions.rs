//! Externally stored job, source, and API definitions.
//!
//! The engine treats definition storage as a collaborator behind
//! [`DefinitionStore`]. The bundled JSON-file implementation supports
//! `${ENV_VAR}` placeholders, resolved against the process environment
//! at load time so credentials stay out of the file.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use tapline_types::api::ApiConfig;
use tapline_types::error::{EngineError, Result};
use tapline_types::job::EtlJob;
use tapline_types::source::SourceConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns [`EngineError::Config`] naming every unset variable.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(val) => {
                result = result.replace(&cap[0], &val);
            }
            Err(_) => missing.push(var_name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(EngineError::Config(format!(
            "missing environment variable(s): {}",
            missing.join(", ")
        )));
    }
    Ok(result)
}

/// Everything one definition file holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionBundle {
    #[serde(default)]
    pub jobs: Vec<EtlJob>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub apis: Vec<ApiConfig>,
}

/// Collaborator providing durable definition lists.
pub trait DefinitionStore: Send + Sync {
    /// # Errors
    ///
    /// Implementation-specific read/parse failures.
    fn load_jobs(&self) -> Result<Vec<EtlJob>>;

    /// # Errors
    ///
    /// Implementation-specific read/parse failures.
    fn load_sources(&self) -> Result<Vec<SourceConfig>>;

    /// # Errors
    ///
    /// Implementation-specific read/parse failures.
    fn load_apis(&self) -> Result<Vec<ApiConfig>>;

    /// # Errors
    ///
    /// Implementation-specific write failures.
    fn save_jobs(&self, jobs: &[EtlJob]) -> Result<()>;

    /// # Errors
    ///
    /// Implementation-specific write failures.
    fn save_sources(&self, sources: &[SourceConfig]) -> Result<()>;

    /// # Errors
    ///
    /// Implementation-specific write failures.
    fn save_apis(&self, apis: &[ApiConfig]) -> Result<()>;
}

/// Single-file JSON implementation of [`DefinitionStore`].
///
/// Saving serializes current values, so `${ENV}` placeholders survive
/// only in hand-edited files, not across a save.
pub struct JsonDefinitionStore {
    path: PathBuf,
}

impl JsonDefinitionStore {
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// Read and parse the whole bundle. Invalid job definitions load but
    /// get logged, so operators see them before a run rejects them.
    ///
    /// # Errors
    ///
    /// [`EngineError::Store`] when the file cannot be read,
    /// [`EngineError::Config`] for unset `${ENV}` placeholders or
    /// malformed JSON.
    pub fn load_bundle(&self) -> Result<DefinitionBundle> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| EngineError::Store(format!("read {}: {e}", self.path.display())))?;
        let substituted = substitute_env_vars(&raw)?;
        let bundle: DefinitionBundle = serde_json::from_str(&substituted)
            .map_err(|e| EngineError::Config(format!("parse {}: {e}", self.path.display())))?;

        for job in &bundle.jobs {
            let errors = job.validation_errors();
            if !errors.is_empty() {
                tracing::warn!(job_id = %job.id, problems = errors.join("; "), "Invalid job definition loaded");
            }
        }
        tracing::info!(
            path = %self.path.display(),
            jobs = bundle.jobs.len(),
            sources = bundle.sources.len(),
            apis = bundle.apis.len(),
            "Definitions loaded"
        );
        Ok(bundle)
    }

    /// Write the whole bundle as pretty JSON.
    ///
    /// # Errors
    ///
    /// [`EngineError::Store`] on serialization or write failure.
    pub fn save_bundle(&self, bundle: &DefinitionBundle) -> Result<()> {
        let text = serde_json::to_string_pretty(bundle)
            .map_err(|e| EngineError::Store(format!("serialize definitions: {e}")))?;
        std::fs::write(&self.path, text)
            .map_err(|e| EngineError::Store(format!("write {}: {e}", self.path.display())))?;
        tracing::info!(path = %self.path.display(), "Definitions saved");
        Ok(())
    }

    /// Current bundle, or an empty one when the file does not exist yet.
    fn bundle_or_default(&self) -> Result<DefinitionBundle> {
        if self.path.exists() {
            self.load_bundle()
        } else {
            Ok(DefinitionBundle::default())
        }
    }
}

impl DefinitionStore for JsonDefinitionStore {
    fn load_jobs(&self) -> Result<Vec<EtlJob>> {
        Ok(self.load_bundle()?.jobs)
    }

    fn load_sources(&self) -> Result<Vec<SourceConfig>> {
        Ok(self.load_bundle()?.sources)
    }

    fn load_apis(&self) -> Result<Vec<ApiConfig>> {
        Ok(self.load_bundle()?.apis)
    }

    fn save_jobs(&self, jobs: &[EtlJob]) -> Result<()> {
        let mut bundle = self.bundle_or_default()?;
        bundle.jobs = jobs.to_vec();
        self.save_bundle(&bundle)
    }

    fn save_sources(&self, sources: &[SourceConfig]) -> Result<()> {
        let mut bundle = self.bundle_or_default()?;
        bundle.sources = sources.to_vec();
        self.save_bundle(&bundle)
    }

    fn save_apis(&self, apis: &[ApiConfig]) -> Result<()> {
        let mut bundle = self.bundle_or_default()?;
        bundle.apis = apis.to_vec();
        self.save_bundle(&bundle)
    }
}
