//! Named-channel event registry.
//!
//! Every transition and every recorded outcome is published as a
//! [`BreakerEvent`]. Listeners subscribe to one [`EventKind`] or to all of
//! them and are called synchronously, in subscription order, on the task that
//! caused the event.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Notification channel names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    OpenCircuit,
    CloseCircuit,
    HalfOpen,
    Success,
    Failure,
}

impl EventKind {
    /// Channel name as it appears on the wire and in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::OpenCircuit => "openCircuit",
            EventKind::CloseCircuit => "closeCircuit",
            EventKind::HalfOpen => "halfOpen",
            EventKind::Success => "success",
            EventKind::Failure => "failure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A notification with its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BreakerEvent {
    /// Circuit opened, or a call was rejected while open
    #[serde(rename_all = "camelCase")]
    OpenCircuit { next_attempt: u64 },

    /// Circuit closed
    CloseCircuit,

    /// Cooldown elapsed, trial call allowed
    HalfOpen,

    /// Operation succeeded
    #[serde(rename_all = "camelCase")]
    Success { success_count: u32 },

    /// Operation failed
    #[serde(rename_all = "camelCase")]
    Failure { failure_count: u32 },
}

impl BreakerEvent {
    /// The channel this event is delivered on.
    pub fn kind(&self) -> EventKind {
        match self {
            BreakerEvent::OpenCircuit { .. } => EventKind::OpenCircuit,
            BreakerEvent::CloseCircuit => EventKind::CloseCircuit,
            BreakerEvent::HalfOpen => EventKind::HalfOpen,
            BreakerEvent::Success { .. } => EventKind::Success,
            BreakerEvent::Failure { .. } => EventKind::Failure,
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&BreakerEvent) + Send + Sync>;

struct Subscription {
    id: SubscriptionId,
    kind: Option<EventKind>,
    listener: Listener,
}

/// Registry of listeners keyed by channel.
#[derive(Default)]
pub struct EventRegistry {
    subscriptions: RwLock<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on a single channel.
    pub fn subscribe<F>(&self, kind: EventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Listen on every channel.
    pub fn subscribe_all<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.insert(None, Arc::new(listener))
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.write();
        let before = subscriptions.len();
        subscriptions.retain(|sub| sub.id != id);
        subscriptions.len() != before
    }

    /// Number of active subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver an event to every matching listener.
    ///
    /// Listeners are snapshotted before delivery, so a listener may subscribe
    /// or unsubscribe without deadlocking. Changes take effect from the next
    /// event.
    pub fn emit(&self, event: &BreakerEvent) {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| sub.kind.map_or(true, |k| k == kind))
            .map(|sub| Arc::clone(&sub.listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    fn insert(&self, kind: Option<EventKind>, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().push(Subscription { id, kind, listener });
        id
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}
