//! In-process fan-out of newly-appended events to type-filtered async consumers.
//!
//! The bus is optional: an event store may be constructed without one to avoid cross-test
//! contamination, or in read replicas that never need live notification. Durable consumers
//! (projections) must use the projection engine's checkpointed catch-up, not this bus, as their
//! source of truth - the bus only ever *accelerates* their next tick.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::Notify;

use crate::event::Event;

/// What a subscription matches: either any event of a set of aggregate types, or a
/// per-aggregate-type set of event types.
#[derive(Debug, Clone)]
pub enum SubscriptionFilter {
    AggregateTypes(Vec<String>),
    EventTypesByAggregateType(HashMap<String, Vec<String>>),
}

impl SubscriptionFilter {
    fn matches(&self, event: &Event) -> bool {
        match self {
            SubscriptionFilter::AggregateTypes(types) => types.iter().any(|t| t == &event.aggregate_type),
            SubscriptionFilter::EventTypesByAggregateType(map) => map
                .get(&event.aggregate_type)
                .is_some_and(|event_types| event_types.iter().any(|t| t == &event.event_type)),
        }
    }
}

struct Queue {
    events: Mutex<VecDeque<Event>>,
    notify: Notify,
    active: AtomicBool,
}

struct Subscriber {
    filter: SubscriptionFilter,
    queue: Arc<Queue>,
}

/// Handle returned by [`SubscriptionBus::subscribe`]. Iterate with [`Subscription::recv`];
/// drop it (or call [`Subscription::unsubscribe`]) to stop receiving and let the bus reclaim
/// the slot.
pub struct Subscription {
    id: u64,
    queue: Arc<Queue>,
    bus: Weak<Inner>,
}

impl Subscription {
    /// Awaits the next matching event, or `None` once unsubscribed and nothing is left queued.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            if let Some(event) = self.queue.events.lock().unwrap().pop_front() {
                return Some(event);
            }
            if !self.queue.active.load(Ordering::Acquire) {
                return None;
            }
            self.queue.notify.notified().await;
        }
    }

    pub fn unsubscribe(&self) {
        self.queue.active.store(false, Ordering::Release);
        self.queue.notify.notify_waiters();
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers.lock().unwrap().remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct Inner {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

/// Single-process, single-writer publisher. After a successful `push` transaction commits,
/// the event store hands the committed events to [`SubscriptionBus::publish`] in commit order;
/// the bus offers each event to every active subscription whose filter matches.
///
/// Delivery is at-most-once and best-effort: if a subscriber's queue is full, the oldest
/// queued event for that subscriber is dropped to make room.
#[derive(Clone)]
pub struct SubscriptionBus {
    inner: Arc<Inner>,
    /// Bound on each subscriber's queue. When full, the bus drops the oldest entry.
    queue_capacity: usize,
}

impl SubscriptionBus {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn subscribe(&self, filter: SubscriptionFilter) -> Subscription {
        let queue = Arc::new(Queue {
            events: Mutex::new(VecDeque::with_capacity(self.queue_capacity)),
            notify: Notify::new(),
            active: AtomicBool::new(true),
        });
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner.subscribers.lock().unwrap().insert(
            id,
            Subscriber {
                filter,
                queue: queue.clone(),
            },
        );

        Subscription {
            id,
            queue,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Fans `events` out, in order, to every active subscription whose filter matches. Called
    /// by the event store after a `push` transaction commits - never before.
    pub async fn publish(&self, events: &[Event]) {
        // Snapshot (filter, queue) pairs under the lock, then deliver outside it so a slow
        // consumer draining its own queue can't stall the publish path.
        let snapshot: Vec<(u64, SubscriptionFilter, Arc<Queue>)> = self
            .inner
            .subscribers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| s.queue.active.load(Ordering::Acquire))
            .map(|(id, s)| (*id, s.filter.clone(), s.queue.clone()))
            .collect();

        for (id, filter, queue) in snapshot {
            let mut dropped = 0u64;
            {
                let mut buf = queue.events.lock().unwrap();
                for event in events.iter().filter(|e| filter.matches(e)) {
                    if buf.len() >= self.queue_capacity {
                        buf.pop_front();
                        dropped += 1;
                    }
                    buf.push_back(event.clone());
                }
            }
            if dropped > 0 {
                tracing::warn!(subscription_id = id, dropped, "subscriber queue full, dropped oldest events");
            }
            queue.notify.notify_waiters();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().unwrap().len()
    }
}
