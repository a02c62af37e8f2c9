//! The storage context.
//!
//! [`Storage`] owns everything that would otherwise be process-wide state:
//! one backend, read cache and notification bus per scope, the pending
//! write queue for the encrypted scope, the microtask queue that drives
//! deferred flushes, the ephemeral expiry map and the migration registry.
//! Cloning a `Storage` is cheap and shares that state.

use crate::cache::ReadCache;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::migration::MigrationRegistry;
use crate::notify::{Listener, NotificationBus};
use crate::pending::{FlushPlan, Microtasks, PendingWrite, PendingWrites};
use crate::scope::Scope;
use kvstash_storage::{
    AccessControl, EncryptedBackend, EncryptionKey, MemoryBackend, SecureBackend,
    StorageBackend, StorageResult, MISSING_VALUE,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Which store of a scope a raw key lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RawTarget {
    /// The scope's regular backend.
    Main,
    /// The encrypted scope's biometric sub-store.
    Biometric,
}

/// Backend, cache and listeners for one scope.
pub(crate) struct ScopeState {
    pub(crate) scope: Scope,
    pub(crate) backend: Arc<dyn StorageBackend>,
    pub(crate) cache: ReadCache,
    pub(crate) bus: NotificationBus,
    /// Depth of backend calls issued by this context. Change events that
    /// arrive while non-zero are our own echoes and are ignored.
    own_calls: AtomicUsize,
}

struct OwnCallGuard<'a>(&'a AtomicUsize);

impl<'a> OwnCallGuard<'a> {
    fn enter(depth: &'a AtomicUsize) -> Self {
        depth.fetch_add(1, Ordering::SeqCst);
        Self(depth)
    }
}

impl Drop for OwnCallGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScopeState {
    fn new(scope: Scope, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            scope,
            backend,
            cache: ReadCache::new(),
            bus: NotificationBus::new(),
            own_calls: AtomicUsize::new(0),
        }
    }

    /// Calls the backend, tagging errors with this scope and `operation`.
    pub(crate) fn call<R>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&dyn StorageBackend) -> StorageResult<R>,
    ) -> CoreResult<R> {
        let _guard = OwnCallGuard::enter(&self.own_calls);
        f(self.backend.as_ref()).map_err(CoreError::backend(self.scope, operation))
    }

    fn in_own_call(&self) -> bool {
        self.own_calls.load(Ordering::SeqCst) > 0
    }
}

pub(crate) struct StorageInner {
    pub(crate) config: Config,
    ephemeral: ScopeState,
    persistent: ScopeState,
    encrypted: ScopeState,
    pub(crate) secure: Arc<dyn SecureBackend>,
    /// Expiry times for ephemeral keys written with a TTL.
    expiries: Mutex<HashMap<String, u64>>,
    pub(crate) pending: PendingWrites,
    flush_scheduled: AtomicBool,
    microtasks: Microtasks,
    access_control: Mutex<AccessControl>,
    pub(crate) migrations: MigrationRegistry,
}

impl StorageInner {
    pub(crate) fn state(&self, scope: Scope) -> &ScopeState {
        match scope {
            Scope::Ephemeral => &self.ephemeral,
            Scope::Persistent => &self.persistent,
            Scope::Encrypted => &self.encrypted,
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.config.clock.now_ms()
    }

    /// Writes every staged coalesced write as one batched set and one
    /// batched remove.
    ///
    /// On failure the unwritten entries are staged again so the error can
    /// surface from the next competing operation.
    pub(crate) fn flush_pending(&self) -> CoreResult<()> {
        let plan = self.pending.take_plan();
        if plan.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            sets = plan.set_keys.len(),
            removes = plan.remove_keys.len(),
            "flushing coalesced writes"
        );

        if !plan.set_keys.is_empty() {
            let result = self
                .encrypted
                .call("set_batch", |b| b.set_batch(&plan.set_keys, &plan.set_values));
            if let Err(err) = result {
                self.pending.restore(plan);
                return Err(err);
            }
        }
        if !plan.remove_keys.is_empty() {
            let result = self
                .encrypted
                .call("remove_batch", |b| b.remove_batch(&plan.remove_keys));
            if let Err(err) = result {
                self.pending.restore(FlushPlan {
                    remove_keys: plan.remove_keys,
                    ..FlushPlan::default()
                });
                return Err(err);
            }
        }
        Ok(())
    }

    /// Forces the pending flush before a direct operation on `scope`.
    pub(crate) fn flush_if_encrypted(&self, scope: Scope) -> CoreResult<()> {
        if scope == Scope::Encrypted {
            self.flush_pending()?;
        }
        Ok(())
    }

    /// Stages a coalesced write and schedules one flush per burst.
    pub(crate) fn stage_write(self: &Arc<Self>, key: &str, write: PendingWrite) {
        self.pending.stage(key, write);
        self.encrypted.cache.invalidate(key);
        if !self.flush_scheduled.swap(true, Ordering::SeqCst) {
            let weak = Arc::downgrade(self);
            self.microtasks.defer(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.flush_scheduled.store(false, Ordering::SeqCst);
                    if let Err(err) = inner.flush_pending() {
                        tracing::error!(error = %err, "deferred flush failed; writes stay staged");
                    }
                }
            });
        }
    }

    /// Reads a raw value straight from the backend of `scope`.
    pub(crate) fn read_raw(&self, scope: Scope, key: &str) -> CoreResult<Option<String>> {
        self.read_target(scope, RawTarget::Main, key)
    }

    /// Writes or removes a raw value directly, invalidating its cache entry.
    pub(crate) fn write_raw(&self, scope: Scope, key: &str, value: Option<&str>) -> CoreResult<()> {
        self.write_target(scope, RawTarget::Main, key, value)
    }

    pub(crate) fn read_target(
        &self,
        scope: Scope,
        target: RawTarget,
        key: &str,
    ) -> CoreResult<Option<String>> {
        self.flush_if_encrypted(scope)?;
        match target {
            RawTarget::Main => self.state(scope).call("get", |b| b.get(key)),
            RawTarget::Biometric => self
                .secure
                .get_biometric(key)
                .map_err(CoreError::backend(Scope::Encrypted, "get_biometric")),
        }
    }

    pub(crate) fn write_target(
        &self,
        scope: Scope,
        target: RawTarget,
        key: &str,
        value: Option<&str>,
    ) -> CoreResult<()> {
        self.flush_if_encrypted(scope)?;
        match (target, value) {
            (RawTarget::Main, Some(v)) => self.state(scope).call("set", |b| b.set(key, v))?,
            (RawTarget::Main, None) => self.state(scope).call("remove", |b| b.remove(key))?,
            (RawTarget::Biometric, Some(v)) => self
                .secure
                .set_biometric(key, v)
                .map_err(CoreError::backend(Scope::Encrypted, "set_biometric"))?,
            (RawTarget::Biometric, None) => self
                .secure
                .delete_biometric(key)
                .map_err(CoreError::backend(Scope::Encrypted, "delete_biometric"))?,
        }
        if target == RawTarget::Main {
            self.state(scope).cache.invalidate(key);
            if scope == Scope::Ephemeral {
                self.set_expiry(key, None);
            }
        }
        Ok(())
    }

    pub(crate) fn notify(&self, scope: Scope, key: &str) {
        self.state(scope).bus.notify(key);
    }

    pub(crate) fn expiry(&self, key: &str) -> Option<u64> {
        self.expiries.lock().get(key).copied()
    }

    pub(crate) fn set_expiry(&self, key: &str, expires_at: Option<u64>) {
        let mut expiries = self.expiries.lock();
        match expires_at {
            Some(at) => {
                expiries.insert(key.to_string(), at);
            }
            None => {
                expiries.remove(key);
            }
        }
    }

    /// Runs `f` with `level` applied to the encrypted backend, then restores
    /// the storage-wide level.
    pub(crate) fn with_access_control<R>(
        &self,
        level: Option<AccessControl>,
        f: impl FnOnce() -> CoreResult<R>,
    ) -> CoreResult<R> {
        let Some(level) = level else {
            return f();
        };
        let default = *self.access_control.lock();
        self.secure
            .set_access_control(level)
            .map_err(CoreError::backend(Scope::Encrypted, "set_access_control"))?;
        let result = f();
        let restored = self
            .secure
            .set_access_control(default)
            .map_err(CoreError::backend(Scope::Encrypted, "set_access_control"));
        let value = result?;
        restored?;
        Ok(value)
    }

    /// Handles a change reported by a backend subscription.
    fn on_backend_change(&self, scope: Scope, key: &str) {
        let state = self.state(scope);
        if state.in_own_call() {
            return;
        }
        if key.is_empty() {
            state.cache.clear();
        } else {
            state.cache.invalidate(key);
        }
        tracing::debug!(%scope, key, "external backend change");
        state.bus.notify(key);
    }
}

/// Handle to a storage context.
///
/// `Storage` is the entry point for items, batches, transactions and
/// migrations. All operations are synchronous; coalesced encrypted writes
/// reach the backend when [`run_microtasks`](Self::run_microtasks) drains
/// the deferred flush, or earlier if a competing operation forces it.
///
/// # Example
///
/// ```rust
/// use kvstash_core::{Scope, Storage};
///
/// let storage = Storage::open_in_memory().unwrap();
/// let counter = storage.item("counter", Scope::Persistent, 0u32).build().unwrap();
///
/// counter.set(5u32).unwrap();
/// counter.update(|n| n + 1).unwrap();
/// assert_eq!(*counter.get().unwrap(), 6);
/// ```
#[derive(Clone)]
pub struct Storage {
    pub(crate) inner: Arc<StorageInner>,
}

impl Storage {
    /// Opens a storage context over the given persistent and encrypted
    /// backends.
    ///
    /// The ephemeral scope is always an in-process map owned by the context.
    ///
    /// # Errors
    ///
    /// Returns an error if the encrypted backend rejects the configured
    /// access-control level or shared access group.
    pub fn open_with_backends<S>(
        config: Config,
        persistent: Arc<dyn StorageBackend>,
        encrypted: Arc<S>,
    ) -> CoreResult<Self>
    where
        S: SecureBackend + 'static,
    {
        let secure: Arc<dyn SecureBackend> = encrypted.clone();
        let encrypted: Arc<dyn StorageBackend> = encrypted;

        secure
            .set_access_control(config.access_control)
            .map_err(CoreError::backend(Scope::Encrypted, "set_access_control"))?;
        if let Some(group) = &config.shared_access_group {
            secure
                .set_shared_access_group(group)
                .map_err(CoreError::backend(Scope::Encrypted, "set_shared_access_group"))?;
        }

        let access_control = config.access_control;
        let inner = StorageInner {
            config,
            ephemeral: ScopeState::new(Scope::Ephemeral, Arc::new(MemoryBackend::new())),
            persistent: ScopeState::new(Scope::Persistent, persistent),
            encrypted: ScopeState::new(Scope::Encrypted, encrypted),
            secure,
            expiries: Mutex::new(HashMap::new()),
            pending: PendingWrites::new(),
            flush_scheduled: AtomicBool::new(false),
            microtasks: Microtasks::new(),
            access_control: Mutex::new(access_control),
            migrations: MigrationRegistry::new(),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Opens a storage context backed entirely by memory.
    ///
    /// The encrypted scope uses a freshly generated key.
    ///
    /// # Errors
    ///
    /// Never fails with the bundled backends; the signature matches
    /// [`open_with_backends`](Self::open_with_backends).
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_in_memory_with_config(Config::default())
    }

    /// Opens an in-memory storage context with a custom configuration.
    ///
    /// # Errors
    ///
    /// See [`open_in_memory`](Self::open_in_memory).
    pub fn open_in_memory_with_config(config: Config) -> CoreResult<Self> {
        let encrypted = Arc::new(EncryptedBackend::new(
            Arc::new(MemoryBackend::new()),
            EncryptionKey::generate(),
        ));
        Self::open_with_backends(config, Arc::new(MemoryBackend::new()), encrypted)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Reads a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read (or a forced flush) fails.
    pub fn get_raw(&self, key: &str, scope: Scope) -> CoreResult<Option<String>> {
        self.inner.read_raw(scope, key)
    }

    /// Writes a raw value and notifies the key's listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write (or a forced flush) fails.
    pub fn set_raw(&self, key: &str, value: &str, scope: Scope) -> CoreResult<()> {
        self.inner.write_raw(scope, key, Some(value))?;
        self.inner.notify(scope, key);
        Ok(())
    }

    /// Removes a raw value and notifies the key's listeners.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend removal (or a forced flush) fails.
    pub fn remove_raw(&self, key: &str, scope: Scope) -> CoreResult<()> {
        self.inner.write_raw(scope, key, None)?;
        self.inner.notify(scope, key);
        Ok(())
    }

    /// Returns true if `key` exists in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn has(&self, key: &str, scope: Scope) -> CoreResult<bool> {
        self.inner.flush_if_encrypted(scope)?;
        self.inner.state(scope).call("has", |b| b.has(key))
    }

    /// Returns every key stored in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    pub fn keys(&self, scope: Scope) -> CoreResult<Vec<String>> {
        self.inner.flush_if_encrypted(scope)?;
        self.inner.state(scope).call("keys", |b| b.keys())
    }

    /// Returns the number of keys stored in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    pub fn size(&self, scope: Scope) -> CoreResult<usize> {
        self.inner.flush_if_encrypted(scope)?;
        self.inner.state(scope).call("size", |b| b.size())
    }

    /// Returns every raw entry in `scope`.
    ///
    /// Biometric entries are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn get_all(&self, scope: Scope) -> CoreResult<BTreeMap<String, String>> {
        let keys = self.keys(scope)?;
        if keys.is_empty() {
            return Ok(BTreeMap::new());
        }
        let values = self
            .inner
            .state(scope)
            .call("get_batch", |b| b.get_batch(&keys))?;
        Ok(keys
            .into_iter()
            .zip(values)
            .filter(|(_, value)| value != MISSING_VALUE)
            .collect())
    }

    /// Removes every key in `scope` and notifies all of its listeners.
    ///
    /// Pending encrypted writes are flushed first so the clear is ordered
    /// after them.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or the backend clear fails.
    pub fn clear(&self, scope: Scope) -> CoreResult<()> {
        self.inner.flush_if_encrypted(scope)?;
        let state = self.inner.state(scope);
        state.call("clear", |b| b.clear())?;
        state.cache.clear();
        if scope == Scope::Ephemeral {
            self.inner.expiries.lock().clear();
        }
        tracing::debug!(%scope, "cleared scope");
        state.bus.notify("");
        Ok(())
    }

    /// Clears every scope.
    ///
    /// # Errors
    ///
    /// Returns the first error; later scopes are not cleared.
    pub fn clear_all(&self) -> CoreResult<()> {
        for scope in Scope::ALL {
            self.clear(scope)?;
        }
        Ok(())
    }

    /// Removes every key under `namespace` in `scope`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated or written.
    pub fn clear_namespace(&self, namespace: &str, scope: Scope) -> CoreResult<()> {
        let prefix = self.inner.config.namespace_prefix(namespace);
        let keys: Vec<String> = self
            .keys(scope)?
            .into_iter()
            .filter(|key| key.starts_with(&prefix))
            .collect();
        if keys.is_empty() {
            return Ok(());
        }

        let state = self.inner.state(scope);
        state.call("remove_batch", |b| b.remove_batch(&keys))?;
        for key in &keys {
            state.cache.invalidate(key);
            if scope == Scope::Ephemeral {
                self.inner.set_expiry(key, None);
            }
        }
        tracing::debug!(%scope, namespace, removed = keys.len(), "cleared namespace");
        for key in &keys {
            state.bus.notify(key);
        }
        Ok(())
    }

    /// Removes every biometric-protected value.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-store cannot be cleared.
    pub fn clear_biometric(&self) -> CoreResult<()> {
        self.inner
            .secure
            .clear_biometric()
            .map_err(CoreError::backend(Scope::Encrypted, "clear_biometric"))?;
        self.inner.notify(Scope::Encrypted, "");
        Ok(())
    }

    /// Sets the access-control level applied to encrypted writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the encrypted backend rejects the level.
    pub fn set_access_control(&self, level: AccessControl) -> CoreResult<()> {
        self.inner
            .secure
            .set_access_control(level)
            .map_err(CoreError::backend(Scope::Encrypted, "set_access_control"))?;
        *self.inner.access_control.lock() = level;
        Ok(())
    }

    /// Returns the storage-wide access-control level.
    #[must_use]
    pub fn access_control(&self) -> AccessControl {
        *self.inner.access_control.lock()
    }

    /// Sets the shared access group of the encrypted backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the encrypted backend rejects the group.
    pub fn set_shared_access_group(&self, group: &str) -> CoreResult<()> {
        self.inner
            .secure
            .set_shared_access_group(group)
            .map_err(CoreError::backend(Scope::Encrypted, "set_shared_access_group"))
    }

    /// Writes all staged coalesced writes now.
    ///
    /// # Errors
    ///
    /// Returns the backend error; unwritten entries stay staged.
    pub fn flush_pending(&self) -> CoreResult<()> {
        self.inner.flush_pending()
    }

    /// Returns the number of staged coalesced writes.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.inner.pending.len()
    }

    /// Runs deferred work (the coalesced-write flush).
    ///
    /// Hosts call this after each synchronous turn of their event loop.
    /// Returns the number of tasks run.
    pub fn run_microtasks(&self) -> usize {
        self.inner.microtasks.run()
    }

    /// Registers `listener` for changes to `key` in `scope`.
    ///
    /// The first listener of a scope opens that scope's backend
    /// subscription; dropping the last guard closes it.
    pub fn subscribe(
        &self,
        scope: Scope,
        key: &str,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> KeySubscription {
        self.subscribe_listener(scope, key, Arc::new(listener))
    }

    pub(crate) fn subscribe_listener(
        &self,
        scope: Scope,
        key: &str,
        listener: Listener,
    ) -> KeySubscription {
        let state = self.inner.state(scope);
        let weak = Arc::downgrade(&self.inner);
        let id = state.bus.subscribe(key, listener, move || {
            if scope == Scope::Ephemeral {
                return None;
            }
            let on_change = move |changed: &str, _: Option<&str>| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_backend_change(scope, changed);
                }
            };
            Some(state.backend.add_on_change(Arc::new(on_change)))
        });

        KeySubscription {
            inner: Arc::downgrade(&self.inner),
            scope,
            key: key.to_string(),
            id,
        }
    }

    /// Returns true while `scope` holds a backend change subscription.
    #[must_use]
    pub fn is_watching(&self, scope: Scope) -> bool {
        self.inner.state(scope).bus.is_subscribed()
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("config", &self.inner.config)
            .field("pending_writes", &self.pending_writes())
            .finish_non_exhaustive()
    }
}

/// Guard for a key listener registered with [`Storage::subscribe`].
///
/// Dropping the guard unregisters the listener.
pub struct KeySubscription {
    inner: Weak<StorageInner>,
    scope: Scope,
    key: String,
    id: u64,
}

impl KeySubscription {
    /// Returns the watched key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the watched scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl Drop for KeySubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state(self.scope).bus.unsubscribe(&self.key, self.id);
        }
    }
}

impl fmt::Debug for KeySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySubscription")
            .field("scope", &self.scope)
            .field("key", &self.key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn raw_roundtrip_per_scope() {
        let storage = Storage::open_in_memory().unwrap();
        for scope in Scope::ALL {
            storage.set_raw("k", "v", scope).unwrap();
            assert_eq!(storage.get_raw("k", scope).unwrap().as_deref(), Some("v"));
            assert!(storage.has("k", scope).unwrap());
            storage.remove_raw("k", scope).unwrap();
            assert!(!storage.has("k", scope).unwrap());
        }
    }

    #[test]
    fn scopes_are_isolated() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_raw("k", "p", Scope::Persistent).unwrap();
        assert!(storage.get_raw("k", Scope::Encrypted).unwrap().is_none());
        assert!(storage.get_raw("k", Scope::Ephemeral).unwrap().is_none());
    }

    #[test]
    fn clear_notifies_every_key() {
        let storage = Storage::open_in_memory().unwrap();
        let (a_hits, a) = counter();
        let (b_hits, b) = counter();
        let _a = storage.subscribe(Scope::Persistent, "a", a);
        let _b = storage.subscribe(Scope::Persistent, "b", b);

        storage.set_raw("a", "1", Scope::Persistent).unwrap();
        storage.clear(Scope::Persistent).unwrap();

        assert_eq!(a_hits.load(Ordering::SeqCst), 2);
        assert_eq!(b_hits.load(Ordering::SeqCst), 1);
        assert_eq!(storage.size(Scope::Persistent).unwrap(), 0);
    }

    #[test]
    fn own_writes_are_not_echoed_twice() {
        let storage = Storage::open_in_memory().unwrap();
        let (hits, listener) = counter();
        let _sub = storage.subscribe(Scope::Persistent, "k", listener);

        storage.set_raw("k", "v", Scope::Persistent).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn external_backend_writes_reach_listeners() {
        let persistent = Arc::new(MemoryBackend::new());
        let encrypted = Arc::new(EncryptedBackend::new(
            Arc::new(MemoryBackend::new()),
            EncryptionKey::generate(),
        ));
        let storage =
            Storage::open_with_backends(Config::default(), persistent.clone(), encrypted).unwrap();

        let (hits, listener) = counter();
        let sub = storage.subscribe(Scope::Persistent, "k", listener);
        assert!(storage.is_watching(Scope::Persistent));

        persistent.set("k", "external").unwrap();
        persistent.set("other", "x").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        drop(sub);
        assert!(!storage.is_watching(Scope::Persistent));
        persistent.set("k", "again").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_namespace_only_touches_prefix() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_raw("user:a", "1", Scope::Persistent).unwrap();
        storage.set_raw("user:b", "2", Scope::Persistent).unwrap();
        storage.set_raw("userx", "3", Scope::Persistent).unwrap();

        storage.clear_namespace("user", Scope::Persistent).unwrap();
        assert_eq!(storage.keys(Scope::Persistent).unwrap(), vec!["userx"]);
    }

    #[test]
    fn get_all_returns_entries() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_raw("a", "1", Scope::Encrypted).unwrap();
        storage.set_raw("b", "", Scope::Encrypted).unwrap();

        let all = storage.get_all(Scope::Encrypted).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"], "");
    }

    #[test]
    fn access_control_applies_to_backend() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .set_access_control(AccessControl::AfterFirstUnlock)
            .unwrap();
        assert_eq!(storage.access_control(), AccessControl::AfterFirstUnlock);
    }
}
