//! Typed storage items.
//!
//! A [`StorageItem`] is a typed view over one raw key: it combines a codec,
//! an optional validator with a recovery function, an optional TTL, a cache
//! policy, write coalescing and its own listener set. Items are created
//! through [`Storage::item`] and configured with an [`ItemBuilder`].

use crate::codec::{Codec, JsonCodec};
use crate::envelope::StoredEnvelope;
use crate::error::{CoreError, CoreResult};
use crate::notify::{invoke_all, Listener};
use crate::scope::Scope;
use crate::storage::{KeySubscription, RawTarget, Storage, StorageInner};
use kvstash_storage::AccessControl;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Predicate deciding whether a value may be stored or returned.
pub type Validator<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Maps an invalid value to a replacement.
pub type Recovery<T> = Arc<dyn Fn(&T) -> T + Send + Sync>;

/// Argument of [`StorageItem::set`]: a literal or a function of the
/// previous value.
pub enum SetValue<'a, T> {
    /// Store this value.
    Literal(T),
    /// Store the result of applying this function to the current value.
    Updater(Box<dyn FnOnce(&T) -> T + 'a>),
}

impl<'a, T> SetValue<'a, T> {
    /// Wraps an updater function.
    pub fn updater(f: impl FnOnce(&T) -> T + 'a) -> Self {
        Self::Updater(Box::new(f))
    }
}

impl<T> From<T> for SetValue<'_, T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SetValue<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

impl Storage {
    /// Starts building a JSON-encoded item stored under `key` in `scope`.
    pub fn item<T>(&self, key: impl Into<String>, scope: Scope, default: T) -> ItemBuilder<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.item_with_codec(key, scope, default, JsonCodec)
    }

    /// Starts building an item encoded with a custom codec.
    pub fn item_with_codec<T>(
        &self,
        key: impl Into<String>,
        scope: Scope,
        default: T,
        codec: impl Codec<T> + 'static,
    ) -> ItemBuilder<T> {
        ItemBuilder {
            storage: self.clone(),
            key: key.into(),
            scope,
            default,
            codec: Arc::new(codec),
            namespace: None,
            validate: None,
            on_validation_error: None,
            ttl: None,
            cache: false,
            coalesce_writes: false,
            biometric: false,
            access_control: None,
        }
    }
}

/// Builder for a [`StorageItem`].
///
/// Construction-time checks run in [`build`](Self::build).
#[must_use]
pub struct ItemBuilder<T> {
    storage: Storage,
    key: String,
    scope: Scope,
    default: T,
    codec: Arc<dyn Codec<T>>,
    namespace: Option<String>,
    validate: Option<Validator<T>>,
    on_validation_error: Option<Recovery<T>>,
    ttl: Option<Duration>,
    cache: bool,
    coalesce_writes: bool,
    biometric: bool,
    access_control: Option<AccessControl>,
}

impl<T> ItemBuilder<T> {
    /// Prefixes the key with `namespace` and the configured separator.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Rejects values for which `validate` returns false.
    pub fn validate(mut self, validate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Replaces an invalid stored value on read.
    ///
    /// Without a resolver the default value is used.
    pub fn on_validation_error(mut self, recover: impl Fn(&T) -> T + Send + Sync + 'static) -> Self {
        self.on_validation_error = Some(Arc::new(recover));
        self
    }

    /// Expires written values after `ttl`.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enables the read-through cache for this item.
    pub fn cache(mut self, enabled: bool) -> Self {
        self.cache = enabled;
        self
    }

    /// Coalesces same-turn writes (encrypted scope only).
    pub fn coalesce_writes(mut self, enabled: bool) -> Self {
        self.coalesce_writes = enabled;
        self
    }

    /// Stores the value in the biometric-gated sub-store.
    pub fn biometric(mut self, enabled: bool) -> Self {
        self.biometric = enabled;
        self
    }

    /// Writes with `level` instead of the storage-wide access level.
    pub fn access_control(mut self, level: AccessControl) -> Self {
        self.access_control = Some(level);
        self
    }

    /// Validates the configuration and creates the item.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for an empty key, a TTL below one
    /// millisecond, or
    /// a biometric flag or access-control override outside the encrypted
    /// scope.
    pub fn build(self) -> CoreResult<StorageItem<T>> {
        if self.key.is_empty() {
            return Err(CoreError::invalid_config("item key must not be empty"));
        }
        // Expiry is tracked in whole milliseconds.
        if self.ttl.is_some_and(|ttl| ttl.as_millis() == 0) {
            return Err(CoreError::invalid_config(format!(
                "ttl for {:?} must be at least one millisecond",
                self.key
            )));
        }
        if self.biometric && self.scope != Scope::Encrypted {
            return Err(CoreError::invalid_config(format!(
                "biometric item {:?} must use the encrypted scope",
                self.key
            )));
        }
        if self.access_control.is_some() && self.scope != Scope::Encrypted {
            return Err(CoreError::invalid_config(format!(
                "access control for {:?} requires the encrypted scope",
                self.key
            )));
        }

        let key = self
            .storage
            .inner
            .config
            .qualify(self.namespace.as_deref(), &self.key);
        let coalesce = self.coalesce_writes
            && self.scope == Scope::Encrypted
            && !self.biometric
            && self.access_control.is_none();
        // The ephemeral map and the biometric sub-store are never cached.
        let cache = self.cache && !self.biometric && self.scope != Scope::Ephemeral;

        let listeners = Arc::new(ItemListeners {
            storage: self.storage.clone(),
            scope: self.scope,
            key: key.clone(),
            next_id: AtomicU64::new(0),
            entries: Mutex::new(Vec::new()),
            watch: Mutex::new(None),
        });

        Ok(StorageItem {
            storage: self.storage,
            key,
            scope: self.scope,
            default: Arc::new(self.default),
            codec: self.codec,
            validate: self.validate,
            on_validation_error: self.on_validation_error,
            ttl: self.ttl,
            cache,
            coalesce,
            biometric: self.biometric,
            access_control: self.access_control,
            memo: Mutex::new(None),
            listeners,
        })
    }
}

/// Last resolved payload and the value it produced.
struct Memo<T> {
    payload: Option<String>,
    value: Arc<T>,
}

/// A typed, validated, optionally expiring view over one raw key.
///
/// Reads return `Arc<T>`; as long as the stored payload does not change,
/// repeated reads return the same allocation.
pub struct StorageItem<T> {
    storage: Storage,
    key: String,
    scope: Scope,
    default: Arc<T>,
    codec: Arc<dyn Codec<T>>,
    validate: Option<Validator<T>>,
    on_validation_error: Option<Recovery<T>>,
    ttl: Option<Duration>,
    cache: bool,
    coalesce: bool,
    biometric: bool,
    access_control: Option<AccessControl>,
    memo: Mutex<Option<Memo<T>>>,
    listeners: Arc<ItemListeners>,
}

impl<T> StorageItem<T> {
    /// Returns the fully-qualified raw key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the item's scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the default value.
    #[must_use]
    pub fn default_value(&self) -> Arc<T> {
        Arc::clone(&self.default)
    }

    /// Returns true if reads go through the scope cache.
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache
    }

    /// Returns true if writes are coalesced.
    #[must_use]
    pub fn coalesces_writes(&self) -> bool {
        self.coalesce
    }

    /// Returns true if the value lives in the biometric sub-store.
    #[must_use]
    pub fn is_biometric(&self) -> bool {
        self.biometric
    }

    /// Returns true if this item can use multi-key backend calls.
    pub(crate) fn batchable(&self) -> bool {
        self.validate.is_none()
            && self.ttl.is_none()
            && !self.biometric
            && self.access_control.is_none()
    }

    pub(crate) fn target(&self) -> RawTarget {
        if self.biometric {
            RawTarget::Biometric
        } else {
            RawTarget::Main
        }
    }

    pub(crate) fn encode(&self, value: &T) -> CoreResult<String> {
        self.codec
            .encode(value)
            .map_err(|e| CoreError::codec(&self.key, e))
    }

    fn inner(&self) -> &Arc<StorageInner> {
        &self.storage.inner
    }

    pub(crate) fn clear_memo(&self) {
        *self.memo.lock() = None;
    }

    /// Reads the stored raw value, envelope included.
    fn read_stored(&self) -> CoreResult<Option<String>> {
        let inner = self.inner();
        if self.biometric {
            return inner.read_target(self.scope, RawTarget::Biometric, &self.key);
        }
        let state = inner.state(self.scope);
        if self.cache {
            if let Some(hit) = state.cache.get(&self.key) {
                return Ok(hit);
            }
        }
        if self.coalesce {
            if let Some(staged) = inner.pending.lookup(&self.key) {
                return Ok(staged);
            }
        } else {
            inner.flush_if_encrypted(self.scope)?;
        }

        let raw = state.call("get", |b| b.get(&self.key))?;
        if self.cache {
            tracing::debug!(key = %self.key, scope = %self.scope, "cache miss");
            state.cache.put(&self.key, raw.clone());
        }
        Ok(raw)
    }

    /// Strips the TTL envelope, deleting the key if it has lapsed.
    fn unwrap_ttl(&self, raw: Option<String>) -> CoreResult<Option<String>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let inner = self.inner();
        let now = inner.now_ms();

        if self.scope == Scope::Ephemeral {
            if inner.expiry(&self.key).is_some_and(|at| now >= at) {
                self.remove_stored()?;
                return Ok(None);
            }
            return Ok(Some(raw));
        }

        match StoredEnvelope::parse(&raw) {
            Some(envelope) if envelope.is_expired(now) => {
                tracing::debug!(key = %self.key, scope = %self.scope, "value expired");
                self.remove_stored()?;
                Ok(None)
            }
            Some(envelope) => Ok(Some(envelope.payload)),
            None => Ok(Some(raw)),
        }
    }

    /// Writes an encoded payload, wrapping it in a TTL envelope if needed.
    pub(crate) fn store_payload(&self, payload: &str) -> CoreResult<()> {
        let inner = self.inner();
        let expires_at = self.ttl.map(|ttl| {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            inner.now_ms().saturating_add(ttl_ms)
        });

        if self.scope == Scope::Ephemeral {
            inner.write_raw(self.scope, &self.key, Some(payload))?;
            inner.set_expiry(&self.key, expires_at);
            return Ok(());
        }

        let raw = match expires_at {
            Some(at) => StoredEnvelope::new(at, payload).to_raw(),
            None => payload.to_string(),
        };
        if self.biometric {
            inner.write_target(self.scope, RawTarget::Biometric, &self.key, Some(&raw))?;
            return Ok(());
        }
        if self.coalesce {
            inner.stage_write(&self.key, Some(raw.clone()));
        } else {
            inner.with_access_control(self.access_control, || {
                inner.write_raw(self.scope, &self.key, Some(&raw))
            })?;
        }
        if self.cache {
            inner.state(self.scope).cache.put(&self.key, Some(raw));
        }
        Ok(())
    }

    /// Removes the stored value through the item's write path.
    pub(crate) fn remove_stored(&self) -> CoreResult<()> {
        let inner = self.inner();
        if self.biometric {
            return inner.write_target(self.scope, RawTarget::Biometric, &self.key, None);
        }
        if self.coalesce {
            inner.stage_write(&self.key, None);
        } else {
            inner.write_raw(self.scope, &self.key, None)?;
        }
        if self.cache {
            inner.state(self.scope).cache.put(&self.key, None);
        }
        Ok(())
    }

    pub(crate) fn notify(&self) {
        self.inner().notify(self.scope, &self.key);
    }

    /// Registers `listener` for changes to this item.
    ///
    /// The listener fires after `set`, `delete`, batch and transaction
    /// writes, scope clears and external backend changes to the key.
    /// Dropping the returned guard unregisters it.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> ItemSubscription {
        let id = self.listeners.add(Arc::new(listener));
        ItemSubscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    /// Returns the number of listeners registered on this item.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.entries.lock().len()
    }
}

impl<T: Clone> StorageItem<T> {
    /// Reads the current value.
    ///
    /// Absent or expired values yield the default. A value that fails
    /// validation is replaced by the recovery value (or the default), which
    /// is written back only if it validates itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the stored payload
    /// cannot be decoded.
    pub fn get(&self) -> CoreResult<Arc<T>> {
        let raw = self.read_stored()?;
        self.resolve(raw)
    }

    /// Resolves a raw stored value to the item's value, memoizing the result.
    pub(crate) fn resolve(&self, raw: Option<String>) -> CoreResult<Arc<T>> {
        let payload = self.unwrap_ttl(raw)?;
        if let Some(memo) = self.memo.lock().as_ref() {
            if memo.payload == payload {
                return Ok(Arc::clone(&memo.value));
            }
        }
        let (payload, value) = self.materialize(payload)?;
        *self.memo.lock() = Some(Memo {
            payload,
            value: Arc::clone(&value),
        });
        Ok(value)
    }

    fn materialize(&self, payload: Option<String>) -> CoreResult<(Option<String>, Arc<T>)> {
        let Some(payload) = payload else {
            return Ok((None, Arc::clone(&self.default)));
        };
        let decoded = self
            .codec
            .decode(&payload)
            .map_err(|e| CoreError::codec(&self.key, e))?;
        let Some(validate) = &self.validate else {
            return Ok((Some(payload), Arc::new(decoded)));
        };
        if validate(&decoded) {
            return Ok((Some(payload), Arc::new(decoded)));
        }

        let recovered = match &self.on_validation_error {
            Some(recover) => recover(&decoded),
            None => (*self.default).clone(),
        };
        if !validate(&recovered) {
            tracing::debug!(key = %self.key, "recovered value is invalid, using default");
            return Ok((Some(payload), Arc::clone(&self.default)));
        }

        let encoded = self.encode(&recovered)?;
        self.store_payload(&encoded)?;
        tracing::debug!(key = %self.key, scope = %self.scope, "replaced invalid stored value");
        Ok((Some(encoded), Arc::new(recovered)))
    }

    /// Stores a literal value or the result of an updater.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] without writing if the new value
    /// fails the validator, or a backend or codec error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kvstash_core::{Scope, SetValue, Storage};
    ///
    /// let storage = Storage::open_in_memory().unwrap();
    /// let name = storage.item("name", Scope::Ephemeral, String::new()).build().unwrap();
    ///
    /// name.set("ada".to_string()).unwrap();
    /// name.set(SetValue::updater(|prev: &String| prev.to_uppercase())).unwrap();
    /// assert_eq!(name.get().unwrap().as_str(), "ADA");
    /// ```
    pub fn set<'a>(&self, value: impl Into<SetValue<'a, T>>) -> CoreResult<()>
    where
        T: 'a,
    {
        let next = match value.into() {
            SetValue::Literal(value) => value,
            SetValue::Updater(update) => {
                let previous = self.get()?;
                update(&previous)
            }
        };
        self.write_value(&next)?;
        self.notify();
        Ok(())
    }

    /// Stores the result of applying `update` to the current value.
    ///
    /// # Errors
    ///
    /// See [`set`](Self::set).
    pub fn update(&self, update: impl FnOnce(&T) -> T) -> CoreResult<()> {
        self.set(SetValue::updater(update))
    }

    /// Validates, encodes and writes `value` without notifying.
    pub(crate) fn write_value(&self, value: &T) -> CoreResult<()> {
        self.check(value)?;
        self.clear_memo();
        let encoded = self.encode(value)?;
        self.store_payload(&encoded)
    }

    pub(crate) fn check(&self, value: &T) -> CoreResult<()> {
        match &self.validate {
            Some(validate) if !validate(value) => Err(CoreError::validation(&self.key)),
            _ => Ok(()),
        }
    }

    /// Removes the stored value; later reads return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend removal fails.
    pub fn delete(&self) -> CoreResult<()> {
        self.clear_memo();
        self.remove_stored()?;
        self.notify();
        Ok(())
    }

    /// Returns true if a live value is stored, without materializing the
    /// default.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn has(&self) -> CoreResult<bool> {
        let raw = self.read_stored()?;
        Ok(self.unwrap_ttl(raw)?.is_some())
    }
}

impl<T> fmt::Debug for StorageItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageItem")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("ttl", &self.ttl)
            .field("cache", &self.cache)
            .field("coalesce", &self.coalesce)
            .field("biometric", &self.biometric)
            .field("access_control", &self.access_control)
            .finish_non_exhaustive()
    }
}

/// Listener set of one item, attached to the scope bus while non-empty.
struct ItemListeners {
    storage: Storage,
    scope: Scope,
    key: String,
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
    watch: Mutex<Option<KeySubscription>>,
}

impl ItemListeners {
    fn add(self: &Arc<Self>, listener: Listener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let first = {
            let mut entries = self.entries.lock();
            entries.push((id, listener));
            entries.len() == 1
        };
        if first {
            let weak = Arc::downgrade(self);
            let watch = self.storage.subscribe_listener(
                self.scope,
                &self.key,
                Arc::new(move || {
                    if let Some(listeners) = weak.upgrade() {
                        listeners.emit();
                    }
                }),
            );
            *self.watch.lock() = Some(watch);
        }
        id
    }

    fn remove(&self, id: u64) {
        let now_empty = {
            let mut entries = self.entries.lock();
            entries.retain(|(lid, _)| *lid != id);
            entries.is_empty()
        };
        if now_empty {
            let watch = self.watch.lock().take();
            drop(watch);
        }
    }

    fn emit(&self) {
        let targets: Vec<Listener> = self
            .entries
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        invoke_all(&targets, &self.key);
    }
}

/// Guard for an item listener; dropping it unsubscribes.
pub struct ItemSubscription {
    listeners: Weak<ItemListeners>,
    id: u64,
}

impl ItemSubscription {
    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for ItemSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

impl fmt::Debug for ItemSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemSubscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec::StringCodec;
    use crate::config::Config;
    use std::sync::atomic::AtomicUsize;

    fn manual_storage() -> (Arc<ManualClock>, Storage) {
        let clock = Arc::new(ManualClock::new(1_000));
        let config = Config::new().clock(clock.clone());
        (clock, Storage::open_in_memory_with_config(config).unwrap())
    }

    #[test]
    fn absent_value_reads_default() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage.item("n", Scope::Persistent, 7i64).build().unwrap();
        assert_eq!(*item.get().unwrap(), 7);
        assert!(!item.has().unwrap());
    }

    #[test]
    fn namespace_prefixes_key() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage
            .item("name", Scope::Persistent, String::new())
            .namespace("user")
            .build()
            .unwrap();
        assert_eq!(item.key(), "user:name");
    }

    #[test]
    fn set_rejects_invalid_without_writing() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage
            .item("n", Scope::Persistent, 0i64)
            .validate(|n| *n >= 0)
            .build()
            .unwrap();

        let err = item.set(-1i64).unwrap_err();
        assert!(matches!(err, CoreError::Validation { .. }));
        assert!(storage.get_raw("n", Scope::Persistent).unwrap().is_none());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        let result = storage
            .item("n", Scope::Persistent, 0)
            .ttl(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn sub_millisecond_ttl_is_rejected() {
        let storage = Storage::open_in_memory().unwrap();
        for scope in [Scope::Persistent, Scope::Ephemeral] {
            let result = storage
                .item("n", scope, 0)
                .ttl(Duration::from_micros(500))
                .build();
            assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
        }

        let item = storage
            .item("n", Scope::Persistent, 0u32)
            .ttl(Duration::from_millis(1))
            .build()
            .unwrap();
        item.set(7u32).unwrap();
        assert_eq!(*item.get().unwrap(), 7);
    }

    #[test]
    fn staged_write_invalidates_cached_reader() {
        let storage = Storage::open_in_memory().unwrap();
        let reader = storage
            .item("shared", Scope::Encrypted, 0u32)
            .cache(true)
            .build()
            .unwrap();
        let writer = storage
            .item("shared", Scope::Encrypted, 0u32)
            .coalesce_writes(true)
            .build()
            .unwrap();

        reader.set(1u32).unwrap();
        assert_eq!(*reader.get().unwrap(), 1);

        writer.set(2u32).unwrap();
        assert_eq!(storage.pending_writes(), 1);
        assert!(storage.inner.state(Scope::Encrypted).cache.get("shared").is_none());
        assert_eq!(*reader.get().unwrap(), 2);
    }

    #[test]
    fn biometric_requires_encrypted_scope() {
        let storage = Storage::open_in_memory().unwrap();
        let result = storage
            .item("pin", Scope::Persistent, 0)
            .biometric(true)
            .build();
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn ttl_envelope_on_persistent_scope() {
        let (clock, storage) = manual_storage();
        let item = storage
            .item("token", Scope::Persistent, String::new())
            .ttl(Duration::from_millis(100))
            .build()
            .unwrap();

        item.set("abc".to_string()).unwrap();
        let raw = storage.get_raw("token", Scope::Persistent).unwrap().unwrap();
        let envelope = StoredEnvelope::parse(&raw).unwrap();
        assert_eq!(envelope.expires_at, 1_100);
        assert_eq!(envelope.payload, "\"abc\"");

        clock.advance(Duration::from_millis(99));
        assert_eq!(item.get().unwrap().as_str(), "abc");
        clock.advance(Duration::from_millis(1));
        assert_eq!(item.get().unwrap().as_str(), "");
        assert!(!storage.has("token", Scope::Persistent).unwrap());
    }

    #[test]
    fn ephemeral_ttl_uses_expiry_map() {
        let (clock, storage) = manual_storage();
        let item = storage
            .item_with_codec("s", Scope::Ephemeral, String::new(), StringCodec)
            .ttl(Duration::from_millis(10))
            .build()
            .unwrap();

        item.set("v".to_string()).unwrap();
        assert_eq!(
            storage.get_raw("s", Scope::Ephemeral).unwrap().as_deref(),
            Some("v")
        );
        clock.advance(Duration::from_millis(10));
        assert!(!item.has().unwrap());
        assert!(storage.get_raw("s", Scope::Ephemeral).unwrap().is_none());
    }

    #[test]
    fn memo_returns_same_allocation() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage
            .item("v", Scope::Persistent, vec![0u8])
            .build()
            .unwrap();
        item.set(vec![1, 2, 3]).unwrap();

        let first = item.get().unwrap();
        let second = item.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        item.set(vec![4]).unwrap();
        assert!(!Arc::ptr_eq(&first, &item.get().unwrap()));
    }

    #[test]
    fn default_is_shared_when_absent() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage.item("v", Scope::Persistent, 5u8).build().unwrap();
        assert!(Arc::ptr_eq(&item.get().unwrap(), &item.default_value()));
    }

    #[test]
    fn updater_sees_previous_value() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage.item("n", Scope::Encrypted, 1u32).build().unwrap();
        item.update(|n| n + 41).unwrap();
        assert_eq!(*item.get().unwrap(), 42);
    }

    #[test]
    fn cached_item_serves_cache() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage
            .item("c", Scope::Persistent, 0u32)
            .cache(true)
            .build()
            .unwrap();
        item.set(3u32).unwrap();
        assert_eq!(
            storage.inner.state(Scope::Persistent).cache.get("c"),
            Some(Some("3".to_string()))
        );
        assert_eq!(*item.get().unwrap(), 3);
    }

    #[test]
    fn subscription_guard_unsubscribes() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage.item("k", Scope::Persistent, 0u8).build().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = item.subscribe(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });

        item.set(1u8).unwrap();
        item.delete().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(storage.is_watching(Scope::Persistent));

        sub.unsubscribe();
        assert_eq!(item.listener_count(), 0);
        assert!(!storage.is_watching(Scope::Persistent));
        item.set(2u8).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn biometric_item_uses_sub_store() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage
            .item("pin", Scope::Encrypted, String::new())
            .biometric(true)
            .coalesce_writes(true)
            .build()
            .unwrap();
        assert!(!item.coalesces_writes());

        item.set("1234".to_string()).unwrap();
        assert_eq!(item.get().unwrap().as_str(), "1234");
        assert!(storage.keys(Scope::Encrypted).unwrap().is_empty());

        storage.clear_biometric().unwrap();
        assert!(!item.has().unwrap());
    }

    #[test]
    fn access_override_restores_default_level() {
        let storage = Storage::open_in_memory().unwrap();
        let item = storage
            .item("k", Scope::Encrypted, 0u8)
            .access_control(AccessControl::WhenPasscodeSetThisDeviceOnly)
            .coalesce_writes(true)
            .build()
            .unwrap();
        assert!(!item.coalesces_writes());

        item.set(1u8).unwrap();
        assert_eq!(storage.access_control(), AccessControl::WhenUnlocked);
        assert_eq!(*item.get().unwrap(), 1);
    }
}
