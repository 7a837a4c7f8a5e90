//! In-process publish/subscribe for transition events
//!
//! Each subscriber owns a bounded queue. `publish` never blocks: when a queue
//! is full the oldest event is overwritten, because observers only care about
//! the current status. A slow subscriber therefore never stalls the publisher
//! or any other subscriber.

use crate::domain::TransitionEvent;
use crate::infra::metrics::Metrics;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Default per-subscriber queue depth
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 16;

/// Opaque handle identifying one subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct QueueState {
    events: VecDeque<TransitionEvent>,
    closed: bool,
}

/// Delivery queue shared between the bus and one subscriber
struct SubscriberQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    capacity: usize,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Push an event, returning true if an older event was overwritten
    fn push(&self, event: TransitionEvent) -> bool {
        let overwritten = {
            let mut state = self.state.lock();
            if state.closed {
                return false;
            }
            let overwritten = if state.events.len() >= self.capacity {
                state.events.pop_front();
                true
            } else {
                false
            };
            state.events.push_back(event);
            overwritten
        };
        self.notify.notify_one();
        overwritten
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_one();
    }
}

/// Receiving end of a subscription
pub struct Subscription {
    id: SubscriberId,
    queue: Arc<SubscriberQueue>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once unsubscribed and the queue is drained.
    pub async fn recv(&mut self) -> Option<TransitionEvent> {
        loop {
            {
                let mut state = self.queue.state.lock();
                if let Some(event) = state.events.pop_front() {
                    return Some(event);
                }
                if state.closed {
                    return None;
                }
            }
            // notify_one stores a permit, so a push between unlock and here is not lost
            self.queue.notify.notified().await;
        }
    }

    /// Take the next queued event without waiting
    pub fn try_recv(&mut self) -> Option<TransitionEvent> {
        self.queue.state.lock().events.pop_front()
    }

    /// Number of events waiting
    pub fn pending(&self) -> usize {
        self.queue.state.lock().events.len()
    }
}

/// Single-writer, multi-reader transition channel
pub struct AlertBus {
    subscribers: Mutex<HashMap<SubscriberId, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    capacity: usize,
    metrics: Arc<Metrics>,
}

impl AlertBus {
    pub fn new(capacity: usize, metrics: Arc<Metrics>) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
            metrics,
        }
    }

    /// Register a new subscriber; it sees only events published from now on
    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let queue = Arc::new(SubscriberQueue::new(self.capacity));
        self.subscribers.lock().insert(id, queue.clone());
        debug!(subscriber = %id, "alert_bus_subscribed");
        Subscription { id, queue }
    }

    /// Remove a subscriber. Safe to call repeatedly; returns false after the first
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.subscribers.lock().remove(&id);
        match removed {
            Some(queue) => {
                queue.close();
                debug!(subscriber = %id, "alert_bus_unsubscribed");
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Deliver an event to every subscriber without blocking
    pub fn publish(&self, event: &TransitionEvent) {
        // Snapshot so queue locks are never taken while holding the registry lock
        let queues: Vec<(SubscriberId, Arc<SubscriberQueue>)> = {
            let mut subscribers = self.subscribers.lock();
            // A queue only the registry still holds belongs to a dropped Subscription
            subscribers.retain(|_, q| Arc::strong_count(q) > 1);
            subscribers.iter().map(|(id, q)| (*id, q.clone())).collect()
        };

        for (id, queue) in queues {
            if queue.push(event.clone()) {
                self.metrics.record_event_overwritten();
                warn!(
                    subscriber = %id,
                    fence_id = %event.geofence_id,
                    "alert_bus_overwrote_oldest"
                );
            }
        }
        self.metrics.record_event_published();
    }
}
