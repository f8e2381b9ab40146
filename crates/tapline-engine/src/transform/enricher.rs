//! Content enricher: stamps metadata and record statistics into headers.

use chrono::Utc;
use serde_json::Value;
use tapline_types::error::Result;
use tapline_types::job::EnricherOptions;
use tapline_types::message::Message;

use super::Transformer;

pub struct ContentEnricher {
    options: EnricherOptions,
}

impl ContentEnricher {
    #[must_use]
    pub fn new(options: EnricherOptions) -> Self {
        Self { options }
    }

    fn add_metadata(&self, out: &mut Message, original: &Message) {
        out.set_header("enriched_at", Utc::now().to_rfc3339());
        out.set_header("original_timestamp", original.created_at().to_rfc3339());
        match &original.payload {
            Value::Array(rows) => {
                out.set_header("payload_type", "records");
                out.set_header("record_count", rows.len().to_string());
            }
            Value::String(s) => {
                out.set_header("payload_type", "text");
                out.set_header("payload_size", s.len().to_string());
            }
            Value::Object(_) => out.set_header("payload_type", "object"),
            _ => out.set_header("payload_type", "scalar"),
        }
    }

    fn add_statistics(&self, out: &mut Message, original: &Message) {
        let Value::Array(rows) = &original.payload else {
            return;
        };
        out.set_header("stats.record_count", rows.len().to_string());
        out.set_header("stats.has_data", (!rows.is_empty()).to_string());
        if let Some(Value::Object(first)) = rows.first() {
            out.set_header("stats.column_count", first.len().to_string());
            let columns: Vec<&str> = first.keys().map(String::as_str).collect();
            out.set_header("stats.columns", columns.join(","));
        }
    }
}

impl Transformer for ContentEnricher {
    fn name(&self) -> &str {
        "content-enricher"
    }

    fn transform(&self, message: &Message) -> Result<Message> {
        tracing::debug!(message_id = message.id(), "Enriching message");

        let mut out = Message::continuing(message, message.payload.clone());
        if self.options.add_metadata {
            self.add_metadata(&mut out, message);
        }
        if self.options.add_statistics {
            self.add_statistics(&mut out, message);
        }
        for (key, value) in &self.options.custom_headers {
            out.set_header(key.clone(), value.clone());
        }
        Ok(out)
    }
}
