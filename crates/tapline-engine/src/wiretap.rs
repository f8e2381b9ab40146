//! Non-intrusive message observer.
//!
//! The wire tap sits at every stage boundary: it records the passing
//! message in the shared [`MessageStore`] and fans out to registered
//! listeners. It never modifies the message and never fails the caller;
//! a broken listener is logged and skipped.

use std::sync::{Arc, RwLock};

use tapline_store::MessageStore;
use tapline_types::message::Message;

/// Observer invoked for every tapped message.
pub trait TapListener: Send + Sync {
    fn name(&self) -> &str;

    /// Called with the intercepted message and its stage label.
    ///
    /// # Errors
    ///
    /// Listener errors are swallowed and logged by the tap.
    fn on_message(&self, message: &Message, context: &str) -> Result<(), String>;
}

/// Wire tap over the engine's message channels.
pub struct WireTap {
    store: Arc<MessageStore>,
    listeners: RwLock<Vec<Arc<dyn TapListener>>>,
    enabled: bool,
}

impl WireTap {
    #[must_use]
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self::with_enabled(store, true)
    }

    #[must_use]
    pub fn with_enabled(store: Arc<MessageStore>, enabled: bool) -> Self {
        Self {
            store,
            listeners: RwLock::new(Vec::new()),
            enabled,
        }
    }

    /// Record a message passing a stage boundary.
    ///
    /// No-op when tapping is disabled. Store and listener failures are
    /// contained here; interception can never break the pipeline.
    pub fn intercept(&self, message: &Message, context: &str) {
        if !self.enabled {
            return;
        }

        tracing::debug!(message_id = message.id(), context, "Wire tap intercept");
        self.store.save(message, context);

        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        for listener in listeners {
            if let Err(e) = listener.on_message(message, context) {
                tracing::error!(listener = listener.name(), error = %e, "Tap listener failed");
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn TapListener>) {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        listeners.push(listener);
    }

    /// Drop every listener with this name. False when none matched.
    pub fn remove_listener(&self, name: &str) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|l| l.name() != name);
        before != listeners.len()
    }

    pub fn clear_listeners(&self) {
        self.listeners
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Shared store backing this tap.
    #[must_use]
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener {
        calls: AtomicUsize,
    }

    impl TapListener for CountingListener {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_message(&self, _message: &Message, _context: &str) -> Result<(), String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingListener;

    impl TapListener for FailingListener {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_message(&self, _message: &Message, _context: &str) -> Result<(), String> {
            Err("boom".to_string())
        }
    }

    fn tap() -> (WireTap, Arc<MessageStore>) {
        let store = Arc::new(MessageStore::in_memory(100));
        (WireTap::new(Arc::clone(&store)), store)
    }

    #[test]
    fn intercept_stores_and_notifies() {
        let (tap, store) = tap();
        let listener = Arc::new(CountingListener { calls: AtomicUsize::new(0) });
        tap.add_listener(Arc::clone(&listener) as Arc<dyn TapListener>);

        let msg = Message::document(serde_json::json!({"a": 1}));
        tap.intercept(&msg, "pipeline-input");

        assert!(store.get(msg.id()).is_some());
        assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disabled_tap_is_noop() {
        let store = Arc::new(MessageStore::in_memory(100));
        let tap = WireTap::with_enabled(Arc::clone(&store), false);
        tap.intercept(&Message::event(), "ctx");
        assert!(store.is_empty());
    }

    #[test]
    fn failing_listener_does_not_break_others() {
        let (tap, store) = tap();
        let counter = Arc::new(CountingListener { calls: AtomicUsize::new(0) });
        tap.add_listener(Arc::new(FailingListener));
        tap.add_listener(Arc::clone(&counter) as Arc<dyn TapListener>);

        let msg = Message::event();
        tap.intercept(&msg, "ctx");

        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
        assert!(store.get(msg.id()).is_some());
    }

    #[test]
    fn listeners_can_be_removed_by_name() {
        let (tap, _) = tap();
        let counter = Arc::new(CountingListener { calls: AtomicUsize::new(0) });
        tap.add_listener(Arc::new(FailingListener));
        tap.add_listener(Arc::clone(&counter) as Arc<dyn TapListener>);

        assert!(tap.remove_listener("failing"));
        assert!(!tap.remove_listener("failing"), "second removal is false");
        assert_eq!(tap.listener_count(), 1);

        tap.intercept(&Message::event(), "ctx");
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1, "remaining listener still fires");
    }

    #[test]
    fn clear_listeners() {
        let (tap, _) = tap();
        tap.add_listener(Arc::new(FailingListener));
        assert_eq!(tap.listener_count(), 1);
        tap.clear_listeners();
        assert_eq!(tap.listener_count(), 0);
    }
}
