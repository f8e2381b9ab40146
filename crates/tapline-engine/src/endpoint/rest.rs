//! REST sink endpoint over reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use tapline_types::api::{ApiConfig, AuthKind, HttpMethod};
use tapline_types::error::{EngineError, Result};
use tapline_types::message::Message;

use super::{DeliveryOutcome, SinkEndpoint};

/// Delivers JSON-text payloads to one configured HTTP target.
///
/// The client is built once per config and reused across deliveries, so
/// connection pooling and TLS state carry over between attempts.
pub struct RestSink {
    config: ApiConfig,
    client: Client,
}

impl RestSink {
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] when the descriptor is invalid or
    /// the client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let errors = config.validation_errors();
        if !errors.is_empty() {
            return Err(EngineError::Config(format!(
                "api '{}': {}",
                config.name,
                errors.join("; ")
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EngineError::Config(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// JSON text for delivery: string payloads go as-is, anything else is
    /// serialized on the way out.
    fn body_of(message: &Message) -> Result<String> {
        match message.payload.as_str() {
            Some(text) => Ok(text.to_string()),
            None => Ok(serde_json::to_string(&message.payload)?),
        }
    }

    fn request(&self, body: String) -> reqwest::RequestBuilder {
        let url = self.config.full_url();
        let mut req = match self.config.method {
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Patch => self.client.patch(&url),
        };

        req = req.header("Content-Type", "application/json");
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }
        req = match &self.config.auth {
            AuthKind::None => req,
            AuthKind::Bearer { token } => req.bearer_auth(token),
            AuthKind::ApiKey { header, key } => req.header(header, key),
            AuthKind::Basic { username, password } => req.basic_auth(username, Some(password)),
        };
        req.body(body)
    }

    fn classify_send_error(e: &reqwest::Error) -> EngineError {
        if e.is_timeout() {
            EngineError::Timeout(format!("request timed out: {e}"))
        } else {
            EngineError::TransientIo(format!("request failed: {e}"))
        }
    }
}

#[async_trait]
impl SinkEndpoint for RestSink {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> Result<()> {
        // HTTP is connectionless from the endpoint's perspective.
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }

    /// Probe with a GET; any response at all counts as reachable.
    async fn is_available(&self) -> bool {
        match self.client.get(self.config.full_url()).send().await {
            Ok(resp) => {
                tracing::debug!(api = %self.config.name, status = resp.status().as_u16(), "Probe");
                true
            }
            Err(e) => {
                tracing::warn!(api = %self.config.name, error = %e, "Probe failed");
                false
            }
        }
    }

    async fn deliver(&self, message: &Message) -> Result<DeliveryOutcome> {
        let body = Self::body_of(message)?;
        tracing::debug!(
            api = %self.config.name,
            method = %self.config.method,
            bytes = body.len(),
            "Delivering"
        );

        let response = self
            .request(body)
            .send()
            .await
            .map_err(|e| Self::classify_send_error(&e))?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            tracing::info!(api = %self.config.name, status, "Delivery accepted");
            return Ok(DeliveryOutcome::Accepted { status });
        }

        let body = response.text().await.unwrap_or_default();
        tracing::warn!(api = %self.config.name, status, "Delivery rejected");
        Ok(DeliveryOutcome::Rejected { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> ApiConfig {
        ApiConfig {
            name: "crm".into(),
            base_url,
            path: "v1/orders".into(),
            method: HttpMethod::Post,
            auth: AuthKind::None,
            headers: BTreeMap::new(),
            timeout_ms: 2_000,
            retry: Default::default(),
        }
    }

    #[tokio::test]
    async fn delivers_string_payload_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(header("Content-Type", "application/json"))
            .and(body_string(r#"[{"id":1}]"#))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let sink = RestSink::new(config(server.uri())).unwrap();
        let msg = Message::document(json!(r#"[{"id":1}]"#));
        match sink.deliver(&msg).await.unwrap() {
            DeliveryOutcome::Accepted { status } => assert_eq!(status, 201),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn serializes_structured_payloads() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string(r#"{"a":1}"#))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let sink = RestSink::new(config(server.uri())).unwrap();
        let outcome = sink.deliver(&Message::document(json!({"a": 1}))).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Accepted { .. }));
    }

    #[tokio::test]
    async fn rejection_captures_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("validation failed"))
            .mount(&server)
            .await;

        let sink = RestSink::new(config(server.uri())).unwrap();
        match sink.deliver(&Message::document(json!("x"))).await.unwrap() {
            DeliveryOutcome::Rejected { status, body } => {
                assert_eq!(status, 422);
                assert_eq!(body, "validation failed");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_modes_set_headers() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(header("Authorization", "Bearer t0k"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.method = HttpMethod::Put;
        cfg.auth = AuthKind::Bearer { token: "t0k".into() };
        let sink = RestSink::new(cfg).unwrap();
        let outcome = sink.deliver(&Message::document(json!("x"))).await.unwrap();
        assert!(matches!(outcome, DeliveryOutcome::Accepted { status: 204 }));
    }

    #[tokio::test]
    async fn api_key_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-Api-Key", "secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.auth = AuthKind::ApiKey { header: "X-Api-Key".into(), key: "secret".into() };
        let sink = RestSink::new(cfg).unwrap();
        sink.deliver(&Message::document(json!("x"))).await.unwrap();
    }

    #[tokio::test]
    async fn unreachable_target_is_transient() {
        // Port 9 (discard) is near-certainly closed.
        let mut cfg = config("http://127.0.0.1:9".into());
        cfg.timeout_ms = 500;
        let sink = RestSink::new(cfg).unwrap();
        let err = sink.deliver(&Message::document(json!("x"))).await.unwrap_err();
        assert!(err.is_retryable(), "connect failure must be retryable: {err}");
    }

    #[tokio::test]
    async fn extract_on_sink_is_unsupported() {
        let sink = RestSink::new(config("http://localhost".into())).unwrap();
        let err = sink.extract("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let mut cfg = config("http://localhost".into());
        cfg.auth = AuthKind::Bearer { token: "  ".into() };
        assert!(matches!(RestSink::new(cfg), Err(EngineError::Config(_))));
    }
}
