//! Format translator: renders the structured payload as JSON text, the
//! shape the REST sink delivers.

use serde_json::Value;
use tapline_types::error::{EngineError, Result};
use tapline_types::job::TranslatorOptions;
use tapline_types::message::Message;

use super::Transformer;

pub struct JsonTranslator {
    options: TranslatorOptions,
}

impl JsonTranslator {
    #[must_use]
    pub fn new(options: TranslatorOptions) -> Self {
        Self { options }
    }

    fn render(&self, payload: &Value) -> Result<String> {
        let text = if self.options.pretty_print {
            serde_json::to_string_pretty(payload)
        } else {
            serde_json::to_string(payload)
        };
        text.map_err(|e| EngineError::Transform {
            name: "json-translator".to_string(),
            message: format!("payload serialization failed: {e}"),
        })
    }
}

impl Transformer for JsonTranslator {
    fn name(&self) -> &str {
        "json-translator"
    }

    fn transform(&self, message: &Message) -> Result<Message> {
        // A null payload renders as an empty record set, not "null".
        let payload = if message.payload.is_null() {
            tracing::warn!(message_id = message.id(), "Null payload, emitting empty record set");
            Value::Array(Vec::new())
        } else {
            message.payload.clone()
        };

        let text = self.render(&payload)?;
        tracing::debug!(message_id = message.id(), bytes = text.len(), "Rendered JSON payload");

        let mut out = Message::continuing(message, Value::String(text));
        out.set_header("content_type", "application/json");
        out.set_header("format", if self.options.pretty_print { "pretty" } else { "compact" });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compact_rendering() {
        let out = JsonTranslator::new(TranslatorOptions::default())
            .transform(&Message::document(json!([{"a": 1}])))
            .unwrap();
        assert_eq!(out.payload, json!(r#"[{"a":1}]"#));
        assert_eq!(out.header("content_type"), Some("application/json"));
        assert_eq!(out.header("format"), Some("compact"));
    }

    #[test]
    fn pretty_rendering() {
        let out = JsonTranslator::new(TranslatorOptions { pretty_print: true })
            .transform(&Message::document(json!([{"a": 1}])))
            .unwrap();
        let text = out.payload.as_str().unwrap();
        assert!(text.contains('\n'));
        assert_eq!(out.header("format"), Some("pretty"));
    }

    #[test]
    fn null_payload_becomes_empty_array() {
        let out = JsonTranslator::new(TranslatorOptions::default())
            .transform(&Message::document(Value::Null))
            .unwrap();
        assert_eq!(out.payload, json!("[]"));
    }

    #[test]
    fn column_order_is_preserved() {
        let payload: Value = serde_json::from_str(r#"[{"zeta": 1, "alpha": 2}]"#).unwrap();
        let out = JsonTranslator::new(TranslatorOptions::default())
            .transform(&Message::document(payload))
            .unwrap();
        let text = out.payload.as_str().unwrap();
        assert!(text.find("zeta").unwrap() < text.find("alpha").unwrap());
    }
}
