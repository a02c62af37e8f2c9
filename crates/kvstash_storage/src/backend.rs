//! Storage backend trait definitions.

use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::sync::Arc;

/// Placeholder returned by [`StorageBackend::get_batch`] for absent keys.
///
/// A legitimately stored empty string stays distinguishable from a missing
/// key.
pub const MISSING_VALUE: &str = "__kvstash_missing__";

/// Callback invoked with `(key, value)` after a backend mutation.
///
/// `value` is `None` for removals. An empty `key` means the whole store
/// changed (for example after [`StorageBackend::clear`]).
pub type ChangeCallback = Arc<dyn Fn(&str, Option<&str>) + Send + Sync>;

/// Handle for a change subscription.
///
/// Dropping the handle unsubscribes.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Creates a subscription that runs `cancel` when dropped.
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Creates a subscription that does nothing on drop.
    #[must_use]
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    /// Unsubscribes immediately.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// A raw key-value backend for one storage scope.
///
/// Backends are **opaque string stores**. kvstash owns all value
/// interpretation - backends do not understand codecs, TTL envelopes or
/// migration markers.
///
/// # Invariants
///
/// - `get` returns exactly the last value passed to `set` for that key
/// - `get_batch` returns one entry per requested key, in order, using
///   [`MISSING_VALUE`] for absent keys
/// - Every mutation is reported to change subscribers after it applies
/// - Backends must be `Send + Sync` and serialize their own internal access
///
/// # Implementors
///
/// - [`super::MemoryBackend`] - For testing and ephemeral data
/// - [`super::FileBackend`] - For persistent storage
/// - [`super::EncryptedBackend`] - For encrypted storage
pub trait StorageBackend: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store rejects the write.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store rejects the removal.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// Removes every key.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be cleared.
    fn clear(&self) -> StorageResult<()>;

    /// Returns all stored keys in unspecified order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be enumerated.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Returns true if `key` is present.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be read.
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns the number of stored keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying store cannot be enumerated.
    fn size(&self) -> StorageResult<usize> {
        Ok(self.keys()?.len())
    }

    /// Stores `values[i]` under `keys[i]` for every index.
    ///
    /// The default implementation loops over [`set`](Self::set); it is
    /// atomic only if the implementor overrides it with an atomic write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::BatchLengthMismatch`] if the slices differ in
    /// length, or the first error from an individual write.
    fn set_batch(&self, keys: &[String], values: &[String]) -> StorageResult<()> {
        check_batch_lengths(keys, values)?;
        for (key, value) in keys.iter().zip(values) {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Reads several keys at once.
    ///
    /// Absent keys are reported as [`MISSING_VALUE`].
    ///
    /// # Errors
    ///
    /// Returns the first read error.
    fn get_batch(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        keys.iter()
            .map(|key| {
                Ok(self
                    .get(key)?
                    .unwrap_or_else(|| MISSING_VALUE.to_string()))
            })
            .collect()
    }

    /// Removes several keys at once.
    ///
    /// # Errors
    ///
    /// Returns the first removal error.
    fn remove_batch(&self, keys: &[String]) -> StorageResult<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }

    /// Registers a change callback.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// dropped.
    fn add_on_change(&self, callback: ChangeCallback) -> Subscription;
}

/// Keychain-style accessibility level applied to encrypted writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessControl {
    /// Readable while the device is unlocked.
    #[default]
    WhenUnlocked,
    /// Readable after the first unlock following a restart.
    AfterFirstUnlock,
    /// Readable while unlocked, only if a passcode is set; never migrates.
    WhenPasscodeSetThisDeviceOnly,
    /// Readable while unlocked; never migrates to another device.
    WhenUnlockedThisDeviceOnly,
    /// Readable after first unlock; never migrates to another device.
    AfterFirstUnlockThisDeviceOnly,
}

/// Extra surface offered only by the encrypted scope's backend.
///
/// Biometric entries live in a parallel sub-store: they are not visible
/// through [`StorageBackend::keys`], [`StorageBackend::get`] or
/// [`StorageBackend::clear`].
pub trait SecureBackend: StorageBackend {
    /// Sets the access-control level applied to subsequent writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the level.
    fn set_access_control(&self, level: AccessControl) -> StorageResult<()>;

    /// Sets the shared access group used for subsequent operations.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the group.
    fn set_shared_access_group(&self, group: &str) -> StorageResult<()>;

    /// Stores a biometric-protected value.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-store rejects the write.
    fn set_biometric(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Reads a biometric-protected value.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-store cannot be read.
    fn get_biometric(&self, key: &str) -> StorageResult<Option<String>>;

    /// Removes a biometric-protected value.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-store rejects the removal.
    fn delete_biometric(&self, key: &str) -> StorageResult<()>;

    /// Returns true if a biometric-protected value exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-store cannot be read.
    fn has_biometric(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get_biometric(key)?.is_some())
    }

    /// Removes every biometric-protected value.
    ///
    /// # Errors
    ///
    /// Returns an error if the sub-store cannot be cleared.
    fn clear_biometric(&self) -> StorageResult<()>;
}

/// Rejects batch writes whose key and value slices differ in length.
pub(crate) fn check_batch_lengths(keys: &[String], values: &[String]) -> StorageResult<()> {
    if keys.len() != values.len() {
        return Err(StorageError::BatchLengthMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    Ok(())
}
