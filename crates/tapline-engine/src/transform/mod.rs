//! Message-to-message transformers.
//!
//! A transformer is a pure mapping over the message payload and headers:
//! it never touches endpoints and never mutates its input. The identity
//! fields of the message (id, correlation id, created-at, kind) are
//! carried through unchanged.

mod enricher;
mod normalizer;
mod translator;

pub use enricher::ContentEnricher;
pub use normalizer::Normalizer;
pub use translator::JsonTranslator;

use tapline_types::error::Result;
use tapline_types::message::Message;

pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the transformed message.
    ///
    /// # Errors
    ///
    /// Returns the transformer's failure; the pipeline wraps it with the
    /// stage name before propagating.
    fn transform(&self, message: &Message) -> Result<Message>;
}
