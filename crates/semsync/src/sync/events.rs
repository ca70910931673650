//! Status and change notifications.
//!
//! Observers register an [`EventCallback`] on the [`StatusBus`]. Delivery is
//! synchronous and best-effort: a panicking callback is logged and does not
//! affect the engine or other observers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::concept::CommitKind;
use crate::provider::ErrorKind;

use super::types::SyncStatus;

/// Events published by the sync engine.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncEvent {
    /// A local mutation was applied and queued.
    ConceptChanged { id: String, kind: CommitKind },

    /// The sync status changed.
    Status(SyncStatus),

    /// A flush drained the queue and started writing.
    FlushStarted { pending: usize },

    FlushCompleted { written: usize, elapsed_ms: u64 },

    /// A flush failed; its commits are back at the front of the queue.
    FlushFailed {
        kind: ErrorKind,
        error: String,
        requeued: usize,
    },

    /// The remote rejected the credential. Flushes are suspended until
    /// [`SyncEngine::reauthenticate`](super::SyncEngine::reauthenticate).
    AuthExpired,

    Loaded { count: usize, skipped: usize },

    /// A best-effort write to a backup provider failed.
    BackupFailed { provider: String, error: String },

    ProviderMigrated { from: String, to: String },
}

/// Callback invoked for every published event.
pub type EventCallback = Arc<dyn Fn(&SyncEvent) + Send + Sync>;

/// Handle returned by [`StatusBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Fan-out of [`SyncEvent`]s to registered observers.
#[derive(Default)]
pub struct StatusBus {
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(SubscriptionId, EventCallback)>>,
}

impl StatusBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, callback));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Deliver `event` to every subscriber.
    ///
    /// Callbacks run outside the subscriber lock so they may subscribe,
    /// unsubscribe or query the engine.
    pub fn publish(&self, event: &SyncEvent) {
        let callbacks: Vec<EventCallback> = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::warn!(?event, "Event subscriber panicked");
            }
        }
    }
}

impl std::fmt::Debug for StatusBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
