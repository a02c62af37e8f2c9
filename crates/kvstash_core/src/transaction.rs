//! Grouped mutations with snapshot rollback.
//!
//! A transaction captures the prior raw value of every key it mutates,
//! once per key. If the body fails, the snapshots are written back in
//! reverse capture order and the body's error is returned unchanged.
//!
//! Rollback is process-local and best-effort: there is no write-ahead log
//! and no crash or cross-process guarantee.

use crate::error::{CoreError, CoreResult};
use crate::item::{SetValue, StorageItem};
use crate::scope::Scope;
use crate::storage::{RawTarget, Storage};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Prior state of one mutated key.
#[derive(Debug)]
struct Snapshot {
    target: RawTarget,
    key: String,
    raw: Option<String>,
    expires_at: Option<u64>,
}

/// Handle passed to a transaction body.
pub struct Transaction<'s> {
    storage: &'s Storage,
    scope: Scope,
    captured: HashSet<(RawTarget, String)>,
    snapshots: Vec<Snapshot>,
}

impl Storage {
    /// Runs `body` as a transaction over `scope`.
    ///
    /// Pending encrypted writes are flushed on entry. If `body` returns an
    /// error, every key it mutated is restored to its pre-transaction raw
    /// value and the error is returned as is.
    ///
    /// # Errors
    ///
    /// Returns the body's error, or the entry flush error converted into `E`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kvstash_core::{CoreError, Scope, Storage};
    ///
    /// let storage = Storage::open_in_memory().unwrap();
    /// storage.set_raw("a", "1", Scope::Persistent).unwrap();
    ///
    /// let result: Result<(), CoreError> = storage.transaction(Scope::Persistent, |tx| {
    ///     tx.set_raw("a", "10")?;
    ///     Err(CoreError::migration_failed("abort"))
    /// });
    /// assert!(result.is_err());
    /// assert_eq!(storage.get_raw("a", Scope::Persistent).unwrap().as_deref(), Some("1"));
    /// ```
    pub fn transaction<R, E>(
        &self,
        scope: Scope,
        body: impl FnOnce(&mut Transaction<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<CoreError>,
    {
        self.inner.flush_if_encrypted(scope)?;
        let mut tx = Transaction {
            storage: self,
            scope,
            captured: HashSet::new(),
            snapshots: Vec::new(),
        };
        match body(&mut tx) {
            Ok(value) => {
                tracing::debug!(%scope, keys = tx.snapshots.len(), "transaction committed");
                Ok(value)
            }
            Err(err) => {
                tx.rollback();
                Err(err)
            }
        }
    }
}

impl Transaction<'_> {
    /// Returns the transaction's scope.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the number of keys mutated so far.
    #[must_use]
    pub fn mutated_keys(&self) -> usize {
        self.snapshots.len()
    }

    /// Reads a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn get_raw(&self, key: &str) -> CoreResult<Option<String>> {
        self.storage.inner.read_raw(self.scope, key)
    }

    /// Writes a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot read or the backend write fails.
    pub fn set_raw(&mut self, key: &str, value: &str) -> CoreResult<()> {
        self.capture(RawTarget::Main, key)?;
        self.storage.set_raw(key, value, self.scope)
    }

    /// Removes a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot read or the backend removal fails.
    pub fn remove_raw(&mut self, key: &str) -> CoreResult<()> {
        self.capture(RawTarget::Main, key)?;
        self.storage.remove_raw(key, self.scope)
    }

    /// Reads an item through its own `get`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeMismatch`] if the item belongs to another
    /// scope, or the item's read error.
    pub fn get_item<T: Clone>(&self, item: &StorageItem<T>) -> CoreResult<Arc<T>> {
        self.check_scope(item)?;
        item.get()
    }

    /// Writes an item through its own `set`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeMismatch`] if the item belongs to another
    /// scope, or the item's write error.
    pub fn set_item<'a, T: Clone + 'a>(
        &mut self,
        item: &StorageItem<T>,
        value: impl Into<SetValue<'a, T>>,
    ) -> CoreResult<()> {
        self.check_scope(item)?;
        self.capture(item.target(), item.key())?;
        item.set(value)
    }

    /// Deletes an item through its own `delete`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ScopeMismatch`] if the item belongs to another
    /// scope, or the item's removal error.
    pub fn remove_item<T: Clone>(&mut self, item: &StorageItem<T>) -> CoreResult<()> {
        self.check_scope(item)?;
        self.capture(item.target(), item.key())?;
        item.delete()
    }

    fn check_scope<T>(&self, item: &StorageItem<T>) -> CoreResult<()> {
        if item.scope() == self.scope {
            Ok(())
        } else {
            Err(CoreError::ScopeMismatch {
                key: item.key().to_string(),
                expected: self.scope,
                actual: item.scope(),
            })
        }
    }

    /// Records the prior value of `key` unless already captured.
    fn capture(&mut self, target: RawTarget, key: &str) -> CoreResult<()> {
        if self.captured.contains(&(target, key.to_string())) {
            return Ok(());
        }
        let inner = &self.storage.inner;
        let raw = inner.read_target(self.scope, target, key)?;
        let expires_at = match (self.scope, target) {
            (Scope::Ephemeral, RawTarget::Main) => inner.expiry(key),
            _ => None,
        };
        self.captured.insert((target, key.to_string()));
        self.snapshots.push(Snapshot {
            target,
            key: key.to_string(),
            raw,
            expires_at,
        });
        Ok(())
    }

    fn rollback(self) {
        let inner = &self.storage.inner;
        let scope = self.scope;
        tracing::debug!(%scope, keys = self.snapshots.len(), "rolling back transaction");

        if let Err(err) = inner.flush_if_encrypted(scope) {
            tracing::warn!(error = %err, "flush before rollback failed");
        }
        for snapshot in self.snapshots.iter().rev() {
            let restored =
                inner.write_target(scope, snapshot.target, &snapshot.key, snapshot.raw.as_deref());
            match restored {
                Ok(()) => {
                    if snapshot.raw.is_some() && snapshot.expires_at.is_some() {
                        inner.set_expiry(&snapshot.key, snapshot.expires_at);
                    }
                    inner.notify(scope, &snapshot.key);
                }
                Err(err) => {
                    tracing::warn!(key = %snapshot.key, error = %err, "rollback write failed");
                }
            }
        }
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("scope", &self.scope)
            .field("snapshots", &self.snapshots)
            .finish_non_exhaustive()
    }
}
