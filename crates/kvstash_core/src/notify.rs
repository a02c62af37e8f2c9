//! Per-scope change notification bus.
//!
//! Each scope keeps a key-indexed listener map fed by at most one backend
//! subscription. The subscription is opened when the first listener
//! registers and dropped when the last one leaves. A notification for the
//! empty key fans out to every registered key.

use kvstash_storage::Subscription;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Callback invoked when a watched key changes.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Runs each listener, isolating panics so one failure cannot stop the rest
/// or abort the mutation that triggered it.
pub(crate) fn invoke_all(listeners: &[Listener], key: &str) {
    for listener in listeners {
        if panic::catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
            tracing::warn!(key, "storage listener panicked");
        }
    }
}

#[derive(Default)]
pub(crate) struct NotificationBus {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<String, Vec<(u64, Listener)>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl NotificationBus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `key`.
    ///
    /// `open` is called to create the backend subscription when this is the
    /// first listener on the bus.
    pub(crate) fn subscribe(
        &self,
        key: &str,
        listener: Listener,
        open: impl FnOnce() -> Option<Subscription>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let first = {
            let mut listeners = self.listeners.lock();
            let first = listeners.is_empty();
            listeners
                .entry(key.to_string())
                .or_default()
                .push((id, listener));
            first
        };

        if first && self.subscription.lock().is_none() {
            let subscription = open();
            *self.subscription.lock() = subscription;
        }
        id
    }

    /// Removes listener `id` from `key`, pruning the bucket when it empties.
    pub(crate) fn unsubscribe(&self, key: &str, id: u64) {
        let now_empty = {
            let mut listeners = self.listeners.lock();
            if let Some(bucket) = listeners.get_mut(key) {
                bucket.retain(|(lid, _)| *lid != id);
                if bucket.is_empty() {
                    listeners.remove(key);
                }
            }
            listeners.is_empty()
        };

        if now_empty {
            // Dropped outside the lock; the backend may take its own locks.
            let subscription = self.subscription.lock().take();
            drop(subscription);
        }
    }

    /// Notifies the listeners of `key`, or of every key when `key` is empty.
    pub(crate) fn notify(&self, key: &str) {
        let targets: Vec<Listener> = {
            let listeners = self.listeners.lock();
            if key.is_empty() {
                listeners
                    .values()
                    .flatten()
                    .map(|(_, l)| Arc::clone(l))
                    .collect()
            } else {
                listeners
                    .get(key)
                    .map(|bucket| bucket.iter().map(|(_, l)| Arc::clone(l)).collect())
                    .unwrap_or_default()
            }
        };
        invoke_all(&targets, key);
    }

    pub(crate) fn key_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Listener) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, Arc::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn notifies_only_matching_key() {
        let bus = NotificationBus::new();
        let (a_hits, a) = counter();
        let (b_hits, b) = counter();
        bus.subscribe("a", a, || None);
        bus.subscribe("b", b, || None);

        bus.notify("a");
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_key_fans_out_to_all() {
        let bus = NotificationBus::new();
        let (a_hits, a) = counter();
        let (b_hits, b) = counter();
        bus.subscribe("a", a, || None);
        bus.subscribe("b", b, || None);

        bus.notify("");
        assert_eq!(a_hits.load(Ordering::SeqCst), 1);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backend_subscription_follows_listener_count() {
        let bus = NotificationBus::new();
        let opened = Arc::new(AtomicUsize::new(0));
        let closed = Arc::new(AtomicUsize::new(0));

        let open = || {
            opened.fetch_add(1, Ordering::SeqCst);
            let closed = Arc::clone(&closed);
            Some(Subscription::new(move || {
                closed.fetch_add(1, Ordering::SeqCst);
            }))
        };

        let (_, l1) = counter();
        let (_, l2) = counter();
        let id1 = bus.subscribe("a", l1, open);
        let id2 = bus.subscribe("b", l2, || unreachable!("already subscribed"));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(bus.is_subscribed());

        bus.unsubscribe("a", id1);
        assert_eq!(bus.key_count(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        bus.unsubscribe("b", id2);
        assert_eq!(bus.key_count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(!bus.is_subscribed());
    }

    #[test]
    fn panicking_listener_does_not_block_others() {
        let bus = NotificationBus::new();
        let (hits, good) = counter();
        bus.subscribe("k", Arc::new(|| panic!("boom")), || None);
        bus.subscribe("k", good, || None);

        bus.notify("k");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
