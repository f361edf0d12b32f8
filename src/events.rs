// ABOUTME: Synchronous publish/subscribe for lifecycle and migration events.
// ABOUTME: Each subscriber call is isolated so one failing listener cannot stall the rest.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Error a subscriber may report. Logged by the bus, never propagated.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct SubscriberError(pub String);

impl SubscriberError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Receives events of type `E`.
pub trait Subscriber<E>: Send + Sync {
    fn notify(&self, event: &E) -> Result<(), SubscriberError>;
}

impl<E, F> Subscriber<E> for F
where
    F: Fn(&E) -> Result<(), SubscriberError> + Send + Sync,
{
    fn notify(&self, event: &E) -> Result<(), SubscriberError> {
        self(event)
    }
}

/// Events that know their own wire name (used in logs).
pub trait NamedEvent {
    fn name(&self) -> &'static str;
}

/// Ordered list of subscribers, delivered to synchronously in registration order.
pub struct EventBus<E> {
    subscribers: Vec<Arc<dyn Subscriber<E>>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl<E: NamedEvent> EventBus<E> {
    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber<E>>) {
        self.subscribers.push(subscriber);
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Deliver `event` to every subscriber.
    ///
    /// Errors and panics from a subscriber are logged and swallowed; delivery
    /// continues with the next subscriber. Returns the number of subscribers
    /// that failed.
    pub fn publish(&self, event: &E) -> usize {
        let mut failures = 0;
        for subscriber in &self.subscribers {
            match catch_unwind(AssertUnwindSafe(|| subscriber.notify(event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    tracing::warn!("subscriber failed on {} event: {}", event.name(), e);
                }
                Err(_) => {
                    failures += 1;
                    tracing::warn!("subscriber panicked on {} event", event.name());
                }
            }
        }
        failures
    }
}
