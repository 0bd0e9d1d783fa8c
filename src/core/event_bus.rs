//! Pub/Sub Event Bus for decoupled key point communication.
//!
//! Architecture:
//! - Key points subscribe to event types with callbacks (immediate invocation)
//! - emit() invokes callbacks synchronously, in subscription order
//! - defer() queues events; flush_deferred() delivers them in a later phase
//!
//! Callback order: FIFO (first-subscribed, first-called) within same event type.
//! Cross-type order undefined - don't rely on ordering between different event types.
//!
//! Delivery works on a snapshot of the subscriber list, so callbacks may
//! subscribe, unsubscribe or emit without deadlocking. Subscribers added or
//! removed during a delivery are only seen by the next emit.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use log::{trace, warn};

/// Maximum events in the deferred queue before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Marker trait for events. Events must be Send + Sync + 'static.
pub trait Event: Any + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
}

// Blanket impl for all qualifying types
impl<T: Any + Send + Sync + 'static> Event for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Type-erased callback
type Callback = Arc<dyn Fn(&dyn Any) + Send + Sync>;

/// Boxed event for queue storage
pub type BoxedEvent = Box<dyn Event>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    by_type: HashMap<TypeId, Vec<(SubscriptionId, Callback)>>,
}

impl Subscribers {
    fn snapshot(&self, type_id: TypeId) -> Vec<Callback> {
        self.by_type
            .get(&type_id)
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

/// Pub/Sub Event Bus with a deferred phase.
///
/// Two modes of operation:
/// 1. Immediate: subscribe() + emit() triggers callbacks instantly
/// 2. Deferred: defer() queues the event, flush_deferred() delivers the batch
///
/// The deferred phase is what lets a dragged point finish updating its own
/// position before any follower reads it.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<RwLock<Subscribers>>,
    queue: Arc<Mutex<Vec<BoxedEvent>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field(
                "subscriber_types",
                &self.subscribers.read().map(|s| s.by_type.len()).unwrap_or(0),
            )
            .field("queue_len", &self.queue.lock().map(|q| q.len()).unwrap_or(0))
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Subscribers::default())),
            queue: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    // ========== Pub/Sub (immediate) ==========

    /// Subscribe to events of type E.
    ///
    /// Callback is invoked synchronously when emit() is called.
    /// Use Arc<Mutex<State>> in the callback for state mutations.
    ///
    /// # Example
    /// ```ignore
    /// let state = Arc::new(Mutex::new(MyState::default()));
    /// let state_clone = Arc::clone(&state);
    /// let id = event_bus.subscribe::<MyEvent, _>(move |e| {
    ///     state_clone.lock().unwrap().handle(e);
    /// });
    /// event_bus.unsubscribe(id);
    /// ```
    pub fn subscribe<E, F>(&self, callback: F) -> SubscriptionId
    where
        E: Event,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let type_id = TypeId::of::<E>();
        let wrapped: Callback = Arc::new(move |any: &dyn Any| {
            if let Some(event) = any.downcast_ref::<E>() {
                callback(event);
            }
        });
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .by_type
            .entry(type_id)
            .or_default()
            .push((id, wrapped));
        id
    }

    /// Remove a single subscription.
    ///
    /// Idempotent: unknown or already-removed ids are ignored.
    /// Returns true if a subscription was actually removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
        let mut removed = false;
        for list in subs.by_type.values_mut() {
            let before = list.len();
            list.retain(|(sub_id, _)| *sub_id != id);
            removed |= list.len() != before;
        }
        subs.by_type.retain(|_, list| !list.is_empty());
        removed
    }

    /// Emit event: invoke all current subscribers synchronously.
    pub fn emit<E: Event>(&self, event: E) {
        let callbacks = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot(TypeId::of::<E>());

        trace!("emit {} -> {} subscriber(s)", event.type_name(), callbacks.len());
        for cb in callbacks {
            cb(&event);
        }
    }

    /// Emit boxed event (for dynamic dispatch).
    pub fn emit_boxed(&self, event: BoxedEvent) {
        // IMPORTANT: deref to dyn Event so type_id/as_any go through the
        // vtable, not Box<dyn Event>'s blanket impl (a Box<dyn Event> is itself an Event)
        let type_id = (*event).as_any().type_id();
        let callbacks = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .snapshot(type_id);

        trace!("emit {} -> {} subscriber(s)", (*event).type_name(), callbacks.len());
        for cb in callbacks {
            cb((*event).as_any());
        }
    }

    // ========== Deferred Processing ==========

    /// Queue an event for the deferred phase. Subscribers are not called yet.
    pub fn defer<E: Event>(&self, event: E) {
        self.defer_boxed(Box::new(event));
    }

    /// Queue a boxed event for the deferred phase.
    pub fn defer_boxed(&self, event: BoxedEvent) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if queue.len() >= MAX_QUEUE_SIZE {
            let evict_count = queue.len() / 2;
            warn!("EventBus queue full ({} events), evicting oldest {}", queue.len(), evict_count);
            queue.drain(0..evict_count);
        }
        queue.push(event);
    }

    /// Deliver every queued event, in queue order.
    ///
    /// Events deferred while flushing are delivered in the same call.
    /// Returns the number of events delivered.
    pub fn flush_deferred(&self) -> usize {
        let mut delivered = 0;
        loop {
            let batch = std::mem::take(&mut *self.queue.lock().unwrap_or_else(|e| e.into_inner()));
            if batch.is_empty() {
                return delivered;
            }
            delivered += batch.len();
            for event in batch {
                self.emit_boxed(event);
            }
        }
    }

    // ========== Utilities ==========

    /// Check if there are subscribers for event type E
    pub fn has_subscribers<E: Event>(&self) -> bool {
        self.subscriber_count::<E>() > 0
    }

    /// Number of subscribers for event type E
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .by_type
            .get(&TypeId::of::<E>())
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Check deferred queue length
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
