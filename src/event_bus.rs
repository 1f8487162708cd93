//! Process-wide broadcast of persisted-state changes.
//!
//! Independently-rendered panels showing the same spawn do not share state;
//! when one of them persists a change, the others learn about it here and
//! re-fetch/re-resolve. Delivery is synchronous and in subscription order
//! within a single `publish` call; there is no ordering guarantee between a
//! publish and other work already in flight. Events are eventually-consistent
//! signals, not transactional commits.

use std::sync::{Arc, Mutex, Weak};

use crate::spawn::{Spawn, SpawnId};

/// The closed set of events panels can broadcast.
#[derive(Debug, Clone)]
pub enum SpawnEvent {
    /// A spawn's persisted state changed. When `updated_spawn` is absent the
    /// subscriber must re-fetch from the store rather than assume nothing
    /// changed. Subscribers watching a different spawn ignore the event.
    SpawnUpdated {
        spawn_id: SpawnId,
        updated_spawn: Option<Box<Spawn>>,
    },
}

type Handler = Arc<dyn Fn(&SpawnEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

/// Typed publish/subscribe channel. Handlers run synchronously, in
/// subscription order, on the publishing thread.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(EventBus::default())
    }

    /// Register a handler. Dropping the returned subscription (or calling
    /// [`Subscription::unsubscribe`]) removes it.
    pub fn subscribe(
        self: &Arc<Self>,
        handler: impl Fn(&SpawnEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Arc::new(handler)));
        log::trace!("event bus: handler {id} subscribed");

        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Deliver an event to every currently-subscribed handler.
    ///
    /// The handler list is snapshotted before delivery, so a handler may
    /// subscribe or publish without deadlocking; a handler subscribed during
    /// delivery does not receive the in-flight event.
    pub fn publish(&self, event: &SpawnEvent) {
        let snapshot: Vec<Handler> = {
            let inner = self.inner.lock().unwrap();
            inner.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        log::trace!(
            "event bus: delivering {:?} to {} handler(s)",
            match event {
                SpawnEvent::SpawnUpdated { spawn_id, .. } => spawn_id,
            },
            snapshot.len()
        );

        for handler in snapshot {
            handler(event);
        }
    }

    fn remove(&self, id: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.retain(|(handler_id, _)| *handler_id != id);
    }
}

/// RAII handle for a registered handler.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
            log::trace!("event bus: handler {} unsubscribed", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn update_event(id: &str) -> SpawnEvent {
        SpawnEvent::SpawnUpdated {
            spawn_id: SpawnId::from(id),
            updated_spawn: None,
        }
    }

    #[test]
    fn delivers_in_subscription_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push("first"))
        };
        let second = {
            let order = Arc::clone(&order);
            bus.subscribe(move |_| order.lock().unwrap().push("second"))
        };

        bus.publish(&update_event("spawn-1"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);

        drop(first);
        drop(second);
    }

    #[test]
    fn dropped_subscription_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = {
            let count = Arc::clone(&count);
            bus.subscribe(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        bus.publish(&update_event("spawn-1"));
        sub.unsubscribe();
        bus.publish(&update_event("spawn-1"));

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_subscribe_during_delivery() {
        let bus = EventBus::new();
        let late_count = Arc::new(AtomicUsize::new(0));
        let late_sub: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let outer = {
            let bus = Arc::clone(&bus);
            let late_count = Arc::clone(&late_count);
            let late_sub = Arc::clone(&late_sub);
            bus.clone().subscribe(move |_| {
                let mut slot = late_sub.lock().unwrap();
                if slot.is_none() {
                    let late_count = Arc::clone(&late_count);
                    *slot = Some(bus.subscribe(move |_| {
                        late_count.fetch_add(1, Ordering::SeqCst);
                    }));
                }
            })
        };

        // First publish installs the late handler but must not deliver to it.
        bus.publish(&update_event("spawn-1"));
        assert_eq!(late_count.load(Ordering::SeqCst), 0);

        // Second publish reaches it.
        bus.publish(&update_event("spawn-1"));
        assert_eq!(late_count.load(Ordering::SeqCst), 1);

        drop(outer);
    }

    #[test]
    fn handler_may_publish_during_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));

        let sub = {
            let bus_inner = Arc::clone(&bus);
            let count = Arc::clone(&count);
            bus.subscribe(move |event| {
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    // Re-entrant publish must not deadlock.
                    if let SpawnEvent::SpawnUpdated { .. } = event {
                        bus_inner.publish(&update_event("spawn-2"));
                    }
                }
            })
        };

        bus.publish(&update_event("spawn-1"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        drop(sub);
    }
}
