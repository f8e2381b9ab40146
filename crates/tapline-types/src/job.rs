//! Job definition: source query, transform options, target, and schedule.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::api::ApiConfig;
use crate::source::SourceConfig;

/// How the normalizer treats null column values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum NullHandling {
    /// Keep nulls in the output record.
    #[default]
    Keep,
    /// Drop null-valued columns from the record.
    Exclude,
    /// Substitute a fixed replacement value.
    Replace { value: String },
}

/// Normalizer switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizerOptions {
    #[serde(default = "default_true")]
    pub normalize_dates: bool,
    #[serde(default = "default_true")]
    pub normalize_decimals: bool,
    #[serde(default = "default_true")]
    pub normalize_column_names: bool,
    #[serde(default)]
    pub null_handling: NullHandling,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            normalize_dates: true,
            normalize_decimals: true,
            normalize_column_names: true,
            null_handling: NullHandling::Keep,
        }
    }
}

/// Content enricher switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnricherOptions {
    #[serde(default = "default_true")]
    pub add_metadata: bool,
    #[serde(default = "default_true")]
    pub add_statistics: bool,
    /// Static headers stamped onto every enriched message.
    #[serde(default)]
    pub custom_headers: BTreeMap<String, String>,
}

impl Default for EnricherOptions {
    fn default() -> Self {
        Self {
            add_metadata: true,
            add_statistics: true,
            custom_headers: BTreeMap::new(),
        }
    }
}

/// JSON translator switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TranslatorOptions {
    #[serde(default)]
    pub pretty_print: bool,
}

fn default_true() -> bool {
    true
}

/// Typed per-transformer configuration.
///
/// `extra` keeps unrecognized keys at the definition boundary so stored
/// jobs survive engine upgrades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TransformOptions {
    #[serde(default)]
    pub normalizer: NormalizerOptions,
    #[serde(default)]
    pub enricher: EnricherOptions,
    #[serde(default)]
    pub translator: TranslatorOptions,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Recurring-execution trigger configuration.
///
/// When enabled, at least one of `cron` / `interval_seconds` must be set;
/// cron takes precedence when both are. A disabled or malformed schedule
/// is inert: scheduling it is a no-op, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schedule {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Schedule {
    /// True when this schedule can actually produce trigger fires.
    #[must_use]
    pub fn is_runnable(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let has_cron = self.cron.as_deref().is_some_and(|c| !c.trim().is_empty());
        let has_interval = self.interval_seconds.is_some_and(|s| s > 0);
        has_cron || has_interval
    }
}

/// A complete extract-transform-load job definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlJob {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub source: SourceConfig,
    pub query: String,
    /// Positional query parameters.
    #[serde(default)]
    pub query_params: Vec<serde_json::Value>,
    pub target: ApiConfig,
    #[serde(default)]
    pub transform: TransformOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
}

impl EtlJob {
    /// All validation problems with this job, empty when executable.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.id.trim().is_empty() {
            errors.push("job id must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            errors.push("job name must not be empty".to_string());
        }
        if self.query.trim().is_empty() {
            errors.push("job query must not be empty".to_string());
        }
        for e in self.source.validation_errors() {
            errors.push(format!("source: {e}"));
        }
        for e in self.target.validation_errors() {
            errors.push(format!("target: {e}"));
        }
        errors
    }

    /// A job is executable only when all parts are present and valid.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}
