//! In-memory storage backend.

use crate::backend::{check_batch_lengths, ChangeCallback, StorageBackend, Subscription};
use crate::error::StorageResult;
use crate::listeners::ChangeListeners;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory storage backend.
///
/// This backend stores all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - The ephemeral scope, whose data never outlives the process
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use kvstash_storage::{MemoryBackend, StorageBackend};
///
/// let backend = MemoryBackend::new();
/// backend.set("a", "1").unwrap();
/// assert_eq!(backend.size().unwrap(), 1);
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
    listeners: Arc<ChangeListeners>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            listeners: ChangeListeners::new(),
        }
    }
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: RwLock::new(map),
            listeners: ChangeListeners::new(),
        }
    }

    /// Returns a copy of all entries.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn entries(&self) -> HashMap<String, String> {
        self.entries.read().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        self.listeners.notify(key, Some(value));
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().remove(key);
        self.listeners.notify(key, None);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.entries.write().clear();
        self.listeners.notify("", None);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    fn size(&self) -> StorageResult<usize> {
        Ok(self.entries.read().len())
    }

    fn set_batch(&self, keys: &[String], values: &[String]) -> StorageResult<()> {
        check_batch_lengths(keys, values)?;
        {
            let mut entries = self.entries.write();
            for (key, value) in keys.iter().zip(values) {
                entries.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in keys.iter().zip(values) {
            self.listeners.notify(key, Some(value));
        }
        Ok(())
    }

    fn remove_batch(&self, keys: &[String]) -> StorageResult<()> {
        {
            let mut entries = self.entries.write();
            for key in keys {
                entries.remove(key);
            }
        }
        for key in keys {
            self.listeners.notify(key, None);
        }
        Ok(())
    }

    fn add_on_change(&self, callback: ChangeCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MISSING_VALUE;
    use crate::error::StorageError;
    use parking_lot::Mutex;

    #[test]
    fn memory_new_is_empty() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(backend.entries().is_empty());
    }

    #[test]
    fn memory_set_then_get() {
        let backend = MemoryBackend::new();
        backend.set("k", "v").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("v"));
        assert!(backend.has("k").unwrap());
    }

    #[test]
    fn memory_overwrite_keeps_last_value() {
        let backend = MemoryBackend::new();
        backend.set("k", "1").unwrap();
        backend.set("k", "2").unwrap();
        assert_eq!(backend.get("k").unwrap().as_deref(), Some("2"));
        assert_eq!(backend.size().unwrap(), 1);
    }

    #[test]
    fn memory_remove_absent_key_is_ok() {
        let backend = MemoryBackend::new();
        assert!(backend.remove("nope").is_ok());
    }

    #[test]
    fn memory_get_batch_uses_missing_sentinel() {
        let backend = MemoryBackend::with_entries([("a", "1"), ("empty", "")]);
        let keys = vec!["a".to_string(), "b".to_string(), "empty".to_string()];

        let values = backend.get_batch(&keys).unwrap();
        assert_eq!(values, vec!["1", MISSING_VALUE, ""]);
    }

    #[test]
    fn memory_set_batch_length_mismatch_fails() {
        let backend = MemoryBackend::new();
        let result = backend.set_batch(&["a".to_string()], &[]);
        assert!(matches!(
            result,
            Err(StorageError::BatchLengthMismatch { keys: 1, values: 0 })
        ));
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn memory_clear_notifies_with_empty_key() {
        let backend = MemoryBackend::with_entries([("a", "1")]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = backend.add_on_change(Arc::new(move |k, v| {
            s.lock().push((k.to_string(), v.map(str::to_string)));
        }));

        backend.clear().unwrap();
        assert_eq!(*seen.lock(), vec![(String::new(), None)]);
        assert_eq!(backend.size().unwrap(), 0);
    }

    #[test]
    fn memory_batch_notifies_each_key() {
        let backend = MemoryBackend::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = backend.add_on_change(Arc::new(move |k, _| {
            s.lock().push(k.to_string());
        }));

        let keys = vec!["a".to_string(), "b".to_string()];
        backend
            .set_batch(&keys, &["1".to_string(), "2".to_string()])
            .unwrap();
        backend.remove_batch(&keys).unwrap();

        assert_eq!(*seen.lock(), vec!["a", "b", "a", "b"]);
    }
}
