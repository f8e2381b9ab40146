//! Relational source connection descriptors.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Supported relational source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Postgres,
    Mysql,
    SqlServer,
    Firebird,
}

impl SourceKind {
    /// Conventional default port for the source family.
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mysql => 3306,
            Self::SqlServer => 1433,
            Self::Firebird => 3050,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::SqlServer => "sqlserver",
            Self::Firebird => "firebird",
        };
        f.write_str(s)
    }
}

/// Connection descriptor for one named relational source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Driver-specific extra properties, passed through opaquely.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl SourceConfig {
    /// Connection URL for the configured source family.
    #[must_use]
    pub fn url(&self) -> String {
        match self.kind {
            SourceKind::SqlServer => format!(
                "{}://{}:{};databaseName={}",
                self.kind, self.host, self.port, self.database
            ),
            _ => format!(
                "{}://{}:{}/{}",
                self.kind, self.host, self.port, self.database
            ),
        }
    }

    /// All validation problems with this descriptor, empty when valid.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("source name must not be empty".to_string());
        }
        if self.host.trim().is_empty() {
            errors.push("source host must not be empty".to_string());
        }
        if self.port == 0 {
            errors.push("source port must be > 0".to_string());
        }
        if self.database.trim().is_empty() {
            errors.push("source database must not be empty".to_string());
        }
        if self.username.trim().is_empty() {
            errors.push("source username must not be empty".to_string());
        }
        errors
    }

    /// True when the descriptor is complete enough to open a connection.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}
