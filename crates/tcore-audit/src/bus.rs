//! In-process publish-subscribe event bus (C15, first half).
//!
//! `publish` delivers to every handler subscribed on the event's topic,
//! synchronously, in registration order. A handler that panics is caught
//! and logged so later handlers in the same publish still run — one bad
//! subscriber must never take down the others.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde_json::Value;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Thread-safe topic -> ordered handler list. Subscription mutation is
/// serialized behind a mutex; publishing holds the lock only long enough
/// to clone the handler list so a slow handler does not block new
/// subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<HashMap<String, Vec<Handler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        EventBus {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self, topic: impl Into<String>, handler: Handler) {
        let mut subs = self.subscribers.lock().expect("event bus lock poisoned");
        subs.entry(topic.into()).or_default().push(handler);
    }

    /// Deliver `payload` to every handler subscribed on `topic`, in
    /// registration order. A handler with no subscribers is a no-op.
    pub fn publish(&self, topic: &str, payload: &Value) {
        let handlers = {
            let subs = self.subscribers.lock().expect("event bus lock poisoned");
            subs.get(topic).cloned().unwrap_or_default()
        };

        for handler in handlers {
            let result = catch_unwind(AssertUnwindSafe(|| handler(payload)));
            if let Err(panic) = result {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(topic, error = %msg, "event bus subscriber panicked; isolated");
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .get(topic)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}
