//! REST target descriptors: URL, method, auth, and retry policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// HTTP methods a sink may use for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpMethod {
    Post,
    Put,
    Patch,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication mode for a sink endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AuthKind {
    #[default]
    None,
    Bearer {
        token: String,
    },
    ApiKey {
        header: String,
        key: String,
    },
    Basic {
        username: String,
        password: String,
    },
}

impl AuthKind {
    /// All validation problems for the configured mode, empty when valid.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        match self {
            Self::None => {}
            Self::Bearer { token } => {
                if token.trim().is_empty() {
                    errors.push("bearer auth requires a token".to_string());
                }
            }
            Self::ApiKey { header, key } => {
                if header.trim().is_empty() {
                    errors.push("api_key auth requires a header name".to_string());
                }
                if key.trim().is_empty() {
                    errors.push("api_key auth requires a key".to_string());
                }
            }
            Self::Basic { username, password } => {
                if username.trim().is_empty() {
                    errors.push("basic auth requires a username".to_string());
                }
                if password.is_empty() {
                    errors.push("basic auth requires a password".to_string());
                }
            }
        }
        errors
    }
}

/// Retry discipline for delivery to one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first (>= 0).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base inter-attempt delay in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Double the delay per attempt (capped) instead of a flat delay.
    #[serde(default = "default_true")]
    pub exponential_backoff: bool,
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            exponential_backoff: true,
        }
    }
}

/// Descriptor for one named REST delivery target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub path: String,
    #[serde(default = "default_method")]
    pub method: HttpMethod,
    #[serde(default)]
    pub auth: AuthKind,
    /// Static headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_method() -> HttpMethod {
    HttpMethod::Post
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl ApiConfig {
    /// Full delivery URL: base joined with path, slashes normalized.
    #[must_use]
    pub fn full_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let path = self.path.trim();
        if path.is_empty() {
            base.to_string()
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// All validation problems with this descriptor, empty when valid.
    #[must_use]
    pub fn validation_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() {
            errors.push("api name must not be empty".to_string());
        }
        if self.base_url.trim().is_empty() {
            errors.push("api base_url must not be empty".to_string());
        }
        errors.extend(self.auth.validation_errors());
        errors
    }

    /// True when the descriptor is complete enough to deliver to.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validation_errors().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApiConfig {
        ApiConfig {
            name: "crm".into(),
            base_url: "https://api.example.com/".into(),
            path: "v1/orders".into(),
            method: HttpMethod::Post,
            auth: AuthKind::None,
            headers: BTreeMap::new(),
            timeout_ms: 30_000,
            retry: RetryPolicy::default(),
        }
    }

    #[test]
    fn full_url_normalizes_slashes() {
        let mut cfg = sample();
        assert_eq!(cfg.full_url(), "https://api.example.com/v1/orders");

        cfg.path = "/v1/orders".into();
        assert_eq!(cfg.full_url(), "https://api.example.com/v1/orders");

        cfg.path = String::new();
        assert_eq!(cfg.full_url(), "https://api.example.com");
    }

    #[test]
    fn auth_validation_per_mode() {
        let mut cfg = sample();
        cfg.auth = AuthKind::Bearer { token: "  ".into() };
        assert!(!cfg.is_valid());

        cfg.auth = AuthKind::ApiKey {
            header: "X-Api-Key".into(),
            key: "abc".into(),
        };
        assert!(cfg.is_valid());

        cfg.auth = AuthKind::Basic {
            username: "u".into(),
            password: String::new(),
        };
        assert!(!cfg.is_valid());
    }

    #[test]
    fn retry_policy_defaults() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 1_000);
        assert!(policy.exponential_backoff);
    }

    #[test]
    fn auth_serde_is_tagged() {
        let auth: AuthKind =
            serde_json::from_str(r#"{"mode": "bearer", "token": "t0k"}"#).unwrap();
        assert_eq!(auth, AuthKind::Bearer { token: "t0k".into() });
        let none: AuthKind = serde_json::from_str(r#"{"mode": "none"}"#).unwrap();
        assert_eq!(none, AuthKind::None);
    }
}
