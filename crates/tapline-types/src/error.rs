//! Structured engine error taxonomy.
//!
//! [`EngineError`] classifies every failure the engine can surface and
//! carries the retry decision with it: configuration and permanent errors
//! are never retried, transient I/O and server-side HTTP failures are.

use thiserror::Error;

/// Classified error from any engine component.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid job/connection/API descriptor. Rejected before execution,
    /// never retried.
    #[error("[config] {0}")]
    Config(String),

    /// Operation not supported by the capability it was called on.
    #[error("[unsupported] {0}")]
    Unsupported(String),

    /// Transient I/O failure (connection drop, reset). Retryable.
    #[error("[transient_io] {0}")]
    TransientIo(String),

    /// HTTP delivery rejected by the target.
    ///
    /// 4xx is permanent; 5xx is transient and eligible for retry.
    #[error("[http] status {status}: {body}")]
    Http { status: u16, body: String },

    /// Operation exceeded its deadline. Retryable.
    #[error("[timeout] {0}")]
    Timeout(String),

    /// A transformer aborted the pipeline. Never retried.
    #[error("[transform] {name}: {message}")]
    Transform { name: String, message: String },

    /// Delivery gave up after exhausting retries.
    #[error("[delivery] failed after {attempts} attempts: {last_error}")]
    Delivery {
        attempts: u32,
        last_error: Box<EngineError>,
    },

    /// The run was cancelled while in flight.
    #[error("[cancelled] {0}")]
    Cancelled(String),

    /// Message store / dead letter persistence failure.
    #[error("[store] {0}")]
    Store(String),

    /// Unclassified internal failure. Never retried.
    #[error("[internal] {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the retry handler may attempt this operation again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientIo(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Permanent errors skip the retry loop and go straight to the
    /// dead letter channel.
    #[must_use]
    pub fn is_permanent_delivery_failure(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }

    /// Snake-case category tag for structured log fields.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Unsupported(_) => "unsupported",
            Self::TransientIo(_) => "transient_io",
            Self::Http { .. } => "http",
            Self::Timeout(_) => "timeout",
            Self::Transform { .. } => "transform",
            Self::Delivery { .. } => "delivery",
            Self::Cancelled(_) => "cancelled",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        Self::TransientIo(e.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("json: {e}"))
    }
}

/// Convenience alias used across the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(EngineError::TransientIo("reset".into()).is_retryable());
        assert!(EngineError::Timeout("30s elapsed".into()).is_retryable());
        assert!(EngineError::Http { status: 503, body: "busy".into() }.is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = EngineError::Http { status: 404, body: "not found".into() };
        assert!(!err.is_retryable());
        assert!(err.is_permanent_delivery_failure());

        let server = EngineError::Http { status: 500, body: "oops".into() };
        assert!(!server.is_permanent_delivery_failure());
    }

    #[test]
    fn config_and_transform_never_retry() {
        assert!(!EngineError::Config("missing host".into()).is_retryable());
        assert!(!EngineError::Transform {
            name: "normalizer".into(),
            message: "bad payload".into()
        }
        .is_retryable());
    }

    #[test]
    fn display_carries_category_tag() {
        let err = EngineError::Http { status: 418, body: "teapot".into() };
        let msg = err.to_string();
        assert!(msg.contains("[http]"));
        assert!(msg.contains("418"));
        assert_eq!(err.category(), "http");
    }

    #[test]
    fn delivery_wraps_last_error() {
        let err = EngineError::Delivery {
            attempts: 4,
            last_error: Box::new(EngineError::Timeout("sink".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("4 attempts"));
        assert!(msg.contains("[timeout]"));
        assert!(!err.is_retryable());
    }
}
