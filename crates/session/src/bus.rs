//! Subscriber registry for inbound events

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

use receptionist_core::InboundEvent;

type Handler = Arc<dyn Fn(&InboundEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<u64, Handler>,
}

/// Fan-out of [`InboundEvent`]s to any number of subscribers
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<RwLock<Registry>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&InboundEvent) + Send + Sync + 'static,
    {
        let mut registry = self.inner.write();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.insert(id, Arc::new(handler));

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe through a channel instead of a callback
    pub fn events(&self) -> (Subscription, mpsc::UnboundedReceiver<InboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    pub fn publish(&self, event: InboundEvent) {
        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<Handler> = self.inner.read().handlers.values().cloned().collect();
        tracing::trace!(?event, subscribers = handlers.len(), "Publishing event");
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.read().handlers.len()
    }
}

/// Handle that keeps a handler registered
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<RwLock<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().handlers.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h1 = hits.clone();
        let _a = bus.subscribe(move |_| {
            h1.fetch_add(1, Ordering::SeqCst);
        });
        let h2 = hits.clone();
        let _b = bus.subscribe(move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(InboundEvent::Transcript("hi".into()));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let sub = bus.subscribe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(InboundEvent::Response("one".into()));
        sub.unsubscribe();
        bus.publish(InboundEvent::Response("two".into()));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let bus = EventBus::new();
        let (_sub, mut rx) = bus.events();

        bus.publish(InboundEvent::Error("boom".into()));
        assert_eq!(rx.recv().await, Some(InboundEvent::Error("boom".into())));
    }
}
