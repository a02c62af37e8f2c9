//! Multi-key item operations.
//!
//! Batches are homogeneous: every item must belong to the declared scope,
//! checked before any backend call. When every item is free of per-item
//! semantics (validator, TTL, biometric store, access-control override) the
//! batch uses one multi-key backend call; otherwise it runs each item's own
//! operation in sequence.

use crate::error::{CoreError, CoreResult};
use crate::item::StorageItem;
use crate::scope::Scope;
use crate::storage::Storage;
use kvstash_storage::{StorageError, MISSING_VALUE};
use std::sync::Arc;

fn check_scope<'a, T: 'a>(
    items: impl IntoIterator<Item = &'a StorageItem<T>>,
    scope: Scope,
) -> CoreResult<()> {
    for item in items {
        if item.scope() != scope {
            return Err(CoreError::ScopeMismatch {
                key: item.key().to_string(),
                expected: scope,
                actual: item.scope(),
            });
        }
    }
    Ok(())
}

impl Storage {
    /// Reads several items of `scope` at once.
    ///
    /// Values staged for a coalesced flush are taken from the pending queue,
    /// and values are taken from the cache when every item enables caching.
    /// The remainder is fetched with one multi-key read.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeMismatch`] for the first item outside
    /// `scope`, or a backend or codec error.
    pub fn get_batch<T: Clone>(
        &self,
        items: &[&StorageItem<T>],
        scope: Scope,
    ) -> CoreResult<Vec<Arc<T>>> {
        check_scope(items.iter().copied(), scope)?;
        if items.is_empty() {
            return Ok(Vec::new());
        }
        if !items.iter().all(|item| item.batchable()) {
            return items.iter().map(|item| item.get()).collect();
        }

        let inner = &self.inner;
        let state = inner.state(scope);
        let all_cached = items.iter().all(|item| item.is_cached());

        let mut resolved: Vec<Option<Option<String>>> = vec![None; items.len()];
        let mut fetch = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            if scope == Scope::Encrypted {
                if let Some(staged) = inner.pending.lookup(item.key()) {
                    resolved[idx] = Some(staged);
                    continue;
                }
            }
            if all_cached {
                if let Some(hit) = state.cache.get(item.key()) {
                    resolved[idx] = Some(hit);
                    continue;
                }
            }
            fetch.push(idx);
        }

        if !fetch.is_empty() {
            let keys: Vec<String> = fetch.iter().map(|&i| items[i].key().to_string()).collect();
            let values = state.call("get_batch", |b| b.get_batch(&keys))?;
            if values.len() != keys.len() {
                return Err(CoreError::backend(scope, "get_batch")(
                    StorageError::BatchLengthMismatch {
                        keys: keys.len(),
                        values: values.len(),
                    },
                ));
            }
            tracing::debug!(%scope, fetched = keys.len(), total = items.len(), "batch read");

            for (&idx, value) in fetch.iter().zip(values) {
                let raw = (value != MISSING_VALUE).then_some(value);
                if items[idx].is_cached() {
                    state.cache.put(items[idx].key(), raw.clone());
                }
                resolved[idx] = Some(raw);
            }
        }

        items
            .iter()
            .zip(resolved)
            .map(|(item, raw)| item.resolve(raw.flatten()))
            .collect()
    }

    /// Writes several items of `scope` at once.
    ///
    /// On the multi-key path pending encrypted writes are flushed first and
    /// the batch itself is never coalesced.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeMismatch`] before writing anything, a
    /// validation error from the per-item path, or a backend or codec error.
    pub fn set_batch<T: Clone>(
        &self,
        entries: Vec<(&StorageItem<T>, T)>,
        scope: Scope,
    ) -> CoreResult<()> {
        check_scope(entries.iter().map(|(item, _)| *item), scope)?;
        if entries.is_empty() {
            return Ok(());
        }
        if !entries.iter().all(|(item, _)| item.batchable()) {
            for (item, value) in entries {
                item.set(value)?;
            }
            return Ok(());
        }

        let mut keys = Vec::with_capacity(entries.len());
        let mut values = Vec::with_capacity(entries.len());
        for (item, value) in &entries {
            keys.push(item.key().to_string());
            values.push(item.encode(value)?);
        }

        let inner = &self.inner;
        inner.flush_if_encrypted(scope)?;
        let state = inner.state(scope);
        state.call("set_batch", |b| b.set_batch(&keys, &values))?;

        for ((item, _), (key, value)) in entries.iter().zip(keys.iter().zip(values)) {
            item.clear_memo();
            if scope == Scope::Ephemeral {
                inner.set_expiry(key, None);
            }
            if item.is_cached() {
                state.cache.put(key, Some(value));
            } else {
                state.cache.invalidate(key);
            }
        }
        for (item, _) in &entries {
            item.notify();
        }
        Ok(())
    }

    /// Removes several items of `scope` at once.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeMismatch`] before removing anything, or a
    /// backend error.
    pub fn remove_batch<T: Clone>(&self, items: &[&StorageItem<T>], scope: Scope) -> CoreResult<()> {
        check_scope(items.iter().copied(), scope)?;
        if items.is_empty() {
            return Ok(());
        }
        if !items.iter().all(|item| item.batchable()) {
            for item in items {
                item.delete()?;
            }
            return Ok(());
        }

        let keys: Vec<String> = items.iter().map(|item| item.key().to_string()).collect();
        let inner = &self.inner;
        inner.flush_if_encrypted(scope)?;
        let state = inner.state(scope);
        state.call("remove_batch", |b| b.remove_batch(&keys))?;

        for item in items {
            item.clear_memo();
            if scope == Scope::Ephemeral {
                inner.set_expiry(item.key(), None);
            }
            state.cache.invalidate(item.key());
        }
        for item in items {
            item.notify();
        }
        Ok(())
    }
}
