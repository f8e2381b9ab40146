//! Ordered transformer chain with wire-tap interception.
//!
//! The pipeline taps the message before any transformer runs
//! (`pipeline-input`), before each stage (`pipeline-filter-<name>`), and
//! after the final stage (`pipeline-output`). A transformer failure
//! aborts the chain with the stage name attached; the failing stage's
//! filter tap has already recorded what it was handed.

use std::sync::Arc;

use tapline_types::error::{EngineError, Result};
use tapline_types::job::TransformOptions;
use tapline_types::message::Message;

use crate::transform::{ContentEnricher, JsonTranslator, Normalizer, Transformer};
use crate::wiretap::WireTap;

pub struct Pipeline {
    transformers: Vec<Arc<dyn Transformer>>,
    tap: Arc<WireTap>,
}

impl Pipeline {
    #[must_use]
    pub fn new(tap: Arc<WireTap>) -> Self {
        Self { transformers: Vec::new(), tap }
    }

    /// Standard ETL chain: normalize, enrich, translate to JSON text.
    #[must_use]
    pub fn for_job(options: &TransformOptions, tap: Arc<WireTap>) -> Self {
        let mut pipeline = Self::new(tap);
        pipeline.add(Arc::new(Normalizer::new(options.normalizer.clone())));
        pipeline.add(Arc::new(ContentEnricher::new(options.enricher.clone())));
        pipeline.add(Arc::new(JsonTranslator::new(options.translator)));
        pipeline
    }

    pub fn add(&mut self, transformer: Arc<dyn Transformer>) {
        tracing::debug!(transformer = transformer.name(), "Pipeline stage added");
        self.transformers.push(transformer);
    }

    /// Drop every stage with this name. False when none matched.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.transformers.len();
        self.transformers.retain(|t| t.name() != name);
        let removed = before != self.transformers.len();
        if removed {
            tracing::debug!(transformer = name, "Pipeline stage removed");
        }
        removed
    }

    /// Drop all stages; the pipeline becomes an identity with taps.
    pub fn clear(&mut self) {
        self.transformers.clear();
    }

    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.transformers.len()
    }

    /// Run the message through every stage in order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transform`] naming the failing stage.
    pub fn process(&self, message: Message) -> Result<Message> {
        tracing::debug!(
            message_id = message.id(),
            stages = self.transformers.len(),
            "Pipeline start"
        );
        self.tap.intercept(&message, "pipeline-input");

        let mut current = message;
        for transformer in &self.transformers {
            // The filter tap sees the message as the stage receives it.
            self.tap
                .intercept(&current, &format!("pipeline-filter-{}", transformer.name()));
            current = transformer.transform(&current).map_err(|e| match e {
                err @ EngineError::Transform { .. } => err,
                other => EngineError::Transform {
                    name: transformer.name().to_string(),
                    message: other.to_string(),
                },
            })?;
        }

        self.tap.intercept(&current, "pipeline-output");
        tracing::debug!(message_id = current.id(), "Pipeline complete");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tapline_store::MessageStore;

    struct Uppercase;

    impl Transformer for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }

        fn transform(&self, message: &Message) -> Result<Message> {
            let text = message.payload.as_str().unwrap_or_default().to_uppercase();
            Ok(Message::continuing(message, json!(text)))
        }
    }

    struct AlwaysFails;

    impl Transformer for AlwaysFails {
        fn name(&self) -> &str {
            "always-fails"
        }

        fn transform(&self, _message: &Message) -> Result<Message> {
            Err(EngineError::Internal("nope".to_string()))
        }
    }

    fn tap() -> (Arc<WireTap>, Arc<MessageStore>) {
        let store = Arc::new(MessageStore::in_memory(100));
        (Arc::new(WireTap::new(Arc::clone(&store))), store)
    }

    #[test]
    fn stages_run_in_order_with_taps() {
        let (tap, store) = tap();
        let mut pipeline = Pipeline::new(Arc::clone(&tap));
        pipeline.add(Arc::new(Uppercase));

        let out = pipeline.process(Message::document(json!("hello"))).unwrap();
        assert_eq!(out.payload, json!("HELLO"));

        assert_eq!(store.by_context("pipeline-input").len(), 1);
        assert_eq!(store.by_context("pipeline-filter-uppercase").len(), 1);
        assert_eq!(store.by_context("pipeline-output").len(), 1);
    }

    #[test]
    fn filter_tap_captures_the_message_entering_the_stage() {
        let (tap, store) = tap();
        let mut pipeline = Pipeline::new(Arc::clone(&tap));
        pipeline.add(Arc::new(Uppercase));

        pipeline.process(Message::document(json!("hello"))).unwrap();

        let tapped = store.by_context("pipeline-filter-uppercase");
        assert_eq!(tapped[0].payload, json!("hello"), "pre-transform payload");
        assert_eq!(store.by_context("pipeline-output")[0].payload, json!("HELLO"));
    }

    #[test]
    fn failure_names_the_stage_and_skips_output_tap() {
        let (tap, store) = tap();
        let mut pipeline = Pipeline::new(Arc::clone(&tap));
        pipeline.add(Arc::new(AlwaysFails));

        let err = pipeline.process(Message::document(json!(1))).unwrap_err();
        match err {
            EngineError::Transform { name, .. } => assert_eq!(name, "always-fails"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.by_context("pipeline-output").is_empty());
        assert_eq!(store.by_context("pipeline-input").len(), 1);
        assert_eq!(
            store.by_context("pipeline-filter-always-fails").len(),
            1,
            "failing stage still leaves its filter tap"
        );
    }

    #[test]
    fn standard_job_pipeline_renders_json_text() {
        let (tap, _) = tap();
        let pipeline = Pipeline::for_job(&TransformOptions::default(), tap);
        assert_eq!(pipeline.stage_count(), 3);

        let out = pipeline
            .process(Message::document(json!([{"Order ID": 7}])))
            .unwrap();
        let text = out.payload.as_str().unwrap();
        assert!(text.contains("order_id"));
        assert_eq!(out.header("record_count"), Some("1"));
        assert_eq!(out.header("content_type"), Some("application/json"));
    }

    #[test]
    fn stages_can_be_removed_and_cleared() {
        let (tap, store) = tap();
        let mut pipeline = Pipeline::new(Arc::clone(&tap));
        pipeline.add(Arc::new(Uppercase));
        pipeline.add(Arc::new(AlwaysFails));

        assert!(pipeline.remove("always-fails"));
        assert!(!pipeline.remove("always-fails"), "second removal is false");
        assert_eq!(pipeline.stage_count(), 1);
        assert!(pipeline.process(Message::document(json!("ok"))).is_ok());

        pipeline.clear();
        assert_eq!(pipeline.stage_count(), 0);
        let msg = Message::document(json!("raw"));
        let out = pipeline.process(msg).unwrap();
        assert_eq!(out.payload, json!("raw"));
        assert!(store.by_context("pipeline-filter-always-fails").is_empty());
    }

    #[test]
    fn empty_pipeline_is_identity_with_taps() {
        let (tap, store) = tap();
        let pipeline = Pipeline::new(tap);
        let msg = Message::document(json!({"a": 1}));
        let out = pipeline.process(msg.clone()).unwrap();
        assert_eq!(out.payload, msg.payload);
        assert_eq!(store.by_context("pipeline-input").len(), 1);
    }
}
