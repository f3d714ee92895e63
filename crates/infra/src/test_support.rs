//! Test doubles shared by the infra unit tests.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value as JsonValue;

use splitter_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};

/// In-memory bus whose publishes can be switched to fail.
///
/// Appends still commit; only delivery is refused.
#[derive(Debug, Default)]
pub(crate) struct FlakyBus {
    inner: InMemoryEventBus<EventEnvelope<JsonValue>>,
    failing: AtomicBool,
}

impl FlakyBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl EventBus<EventEnvelope<JsonValue>> for FlakyBus {
    type Error = String;

    fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("broker unavailable".to_string());
        }
        self.inner.publish(message).map_err(|e| e.to_string())
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.inner.subscribe()
    }
}
