//! Change-listener registry shared by the bundled backends.

use crate::backend::{ChangeCallback, Subscription};
use parking_lot::RwLock;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Registry of change callbacks for one backend.
///
/// Callbacks are invoked outside the registry lock, so a callback may
/// subscribe, unsubscribe or call back into the backend. A panicking
/// callback is isolated and does not stop the remaining callbacks.
#[derive(Default)]
pub struct ChangeListeners {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, ChangeCallback)>>,
}

impl ChangeListeners {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `callback` until the returned subscription is dropped.
    pub fn subscribe(self: &Arc<Self>, callback: ChangeCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().push((id, callback));

        let registry: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.listeners.write().retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Invokes every registered callback with `(key, value)`.
    pub fn notify(&self, key: &str, value: Option<&str>) {
        let snapshot: Vec<ChangeCallback> = self
            .listeners
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(key, value))).is_err() {
                tracing::warn!(key, "backend change listener panicked");
            }
        }
    }

    /// Returns the number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns true if no callback is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }
}

impl std::fmt::Debug for ChangeListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeListeners")
            .field("len", &self.len())
            .finish()
    }
}
