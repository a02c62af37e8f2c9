//! Instrumented backends.
//!
//! [`RecordingBackend`] logs every adapter call so tests can assert how many
//! backend round trips an operation issued. [`FailingBackend`] injects
//! errors into chosen operations.

use kvstash_storage::{
    AccessControl, ChangeCallback, MemoryBackend, SecureBackend, StorageBackend, StorageError,
    StorageResult, Subscription,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// One adapter call observed by a [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// `set(key, value)`
    Set {
        /// Key written.
        key: String,
        /// Value written.
        value: String,
    },
    /// `get(key)`
    Get {
        /// Key read.
        key: String,
    },
    /// `remove(key)`
    Remove {
        /// Key removed.
        key: String,
    },
    /// `clear()`
    Clear,
    /// `keys()`
    Keys,
    /// `has(key)`
    Has {
        /// Key checked.
        key: String,
    },
    /// `size()`
    Size,
    /// `set_batch(keys, values)`
    SetBatch {
        /// Keys written.
        keys: Vec<String>,
        /// Values written.
        values: Vec<String>,
    },
    /// `get_batch(keys)`
    GetBatch {
        /// Keys read.
        keys: Vec<String>,
    },
    /// `remove_batch(keys)`
    RemoveBatch {
        /// Keys removed.
        keys: Vec<String>,
    },
    /// `set_access_control(level)`
    SetAccessControl(AccessControl),
    /// `set_shared_access_group(group)`
    SetAccessGroup(String),
    /// Any biometric sub-store call.
    Biometric {
        /// Operation name.
        op: &'static str,
        /// Key involved, empty for `clear_biometric`.
        key: String,
    },
}

impl Call {
    /// Returns true if the call mutates stored data.
    #[must_use]
    pub fn is_write(&self) -> bool {
        match self {
            Self::Set { .. }
            | Self::Remove { .. }
            | Self::Clear
            | Self::SetBatch { .. }
            | Self::RemoveBatch { .. } => true,
            Self::Biometric { op, .. } => *op != "get_biometric" && *op != "has_biometric",
            _ => false,
        }
    }
}

/// Backend wrapper that records every call before delegating.
#[derive(Debug)]
pub struct RecordingBackend<B = MemoryBackend> {
    inner: B,
    calls: Mutex<Vec<Call>>,
}

impl RecordingBackend<MemoryBackend> {
    /// Records calls to a fresh memory backend.
    #[must_use]
    pub fn memory() -> Arc<Self> {
        Arc::new(Self::new(MemoryBackend::new()))
    }
}

impl<B> RecordingBackend<B> {
    /// Wraps `inner`.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Returns every call recorded so far.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// Returns the recorded mutating calls.
    pub fn writes(&self) -> Vec<Call> {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.is_write())
            .cloned()
            .collect()
    }

    /// Returns the number of recorded `get` and `get_batch` calls.
    pub fn reads(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| matches!(call, Call::Get { .. } | Call::GetBatch { .. }))
            .count()
    }

    /// Forgets the recorded calls.
    pub fn reset(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }
}

impl<B: StorageBackend> StorageBackend for RecordingBackend<B> {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.record(Call::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.record(Call::Get {
            key: key.to_string(),
        });
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.record(Call::Remove {
            key: key.to_string(),
        });
        self.inner.remove(key)
    }

    fn clear(&self) -> StorageResult<()> {
        self.record(Call::Clear);
        self.inner.clear()
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.record(Call::Keys);
        self.inner.keys()
    }

    fn has(&self, key: &str) -> StorageResult<bool> {
        self.record(Call::Has {
            key: key.to_string(),
        });
        self.inner.has(key)
    }

    fn size(&self) -> StorageResult<usize> {
        self.record(Call::Size);
        self.inner.size()
    }

    fn set_batch(&self, keys: &[String], values: &[String]) -> StorageResult<()> {
        self.record(Call::SetBatch {
            keys: keys.to_vec(),
            values: values.to_vec(),
        });
        self.inner.set_batch(keys, values)
    }

    fn get_batch(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        self.record(Call::GetBatch {
            keys: keys.to_vec(),
        });
        self.inner.get_batch(keys)
    }

    fn remove_batch(&self, keys: &[String]) -> StorageResult<()> {
        self.record(Call::RemoveBatch {
            keys: keys.to_vec(),
        });
        self.inner.remove_batch(keys)
    }

    fn add_on_change(&self, callback: ChangeCallback) -> Subscription {
        self.inner.add_on_change(callback)
    }
}

impl<B: SecureBackend> SecureBackend for RecordingBackend<B> {
    fn set_access_control(&self, level: AccessControl) -> StorageResult<()> {
        self.record(Call::SetAccessControl(level));
        self.inner.set_access_control(level)
    }

    fn set_shared_access_group(&self, group: &str) -> StorageResult<()> {
        self.record(Call::SetAccessGroup(group.to_string()));
        self.inner.set_shared_access_group(group)
    }

    fn set_biometric(&self, key: &str, value: &str) -> StorageResult<()> {
        self.record(biometric("set_biometric", key));
        self.inner.set_biometric(key, value)
    }

    fn get_biometric(&self, key: &str) -> StorageResult<Option<String>> {
        self.record(biometric("get_biometric", key));
        self.inner.get_biometric(key)
    }

    fn delete_biometric(&self, key: &str) -> StorageResult<()> {
        self.record(biometric("delete_biometric", key));
        self.inner.delete_biometric(key)
    }

    fn has_biometric(&self, key: &str) -> StorageResult<bool> {
        self.record(biometric("has_biometric", key));
        self.inner.has_biometric(key)
    }

    fn clear_biometric(&self) -> StorageResult<()> {
        self.record(biometric("clear_biometric", ""));
        self.inner.clear_biometric()
    }
}

fn biometric(op: &'static str, key: &str) -> Call {
    Call::Biometric {
        op,
        key: key.to_string(),
    }
}

/// Backend wrapper that fails chosen operations.
///
/// Operations are named after the adapter methods (`"set"`,
/// `"set_batch"`, ...).
#[derive(Debug)]
pub struct FailingBackend<B = MemoryBackend> {
    inner: B,
    failing: Mutex<HashSet<&'static str>>,
}

impl FailingBackend<MemoryBackend> {
    /// Wraps a fresh memory backend.
    #[must_use]
    pub fn memory() -> Arc<Self> {
        Arc::new(Self::new(MemoryBackend::new()))
    }
}

impl<B> FailingBackend<B> {
    /// Wraps `inner` with no failures armed.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Makes `op` fail until [`heal`](Self::heal) is called.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().insert(op);
    }

    /// Disarms every failure.
    pub fn heal(&self) {
        self.failing.lock().clear();
    }

    fn check(&self, op: &'static str) -> StorageResult<()> {
        if self.failing.lock().contains(op) {
            Err(StorageError::Unavailable(format!("injected failure in {op}")))
        } else {
            Ok(())
        }
    }
}

impl<B: StorageBackend> StorageBackend for FailingBackend<B> {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check("set")?;
        self.inner.set(key, value)
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.check("get")?;
        self.inner.get(key)
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.check("remove")?;
        self.inner.remove(key)
    }

    fn clear(&self) -> StorageResult<()> {
        self.check("clear")?;
        self.inner.clear()
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check("keys")?;
        self.inner.keys()
    }

    fn has(&self, key: &str) -> StorageResult<bool> {
        self.check("has")?;
        self.inner.has(key)
    }

    fn size(&self) -> StorageResult<usize> {
        self.check("size")?;
        self.inner.size()
    }

    fn set_batch(&self, keys: &[String], values: &[String]) -> StorageResult<()> {
        self.check("set_batch")?;
        self.inner.set_batch(keys, values)
    }

    fn get_batch(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        self.check("get_batch")?;
        self.inner.get_batch(keys)
    }

    fn remove_batch(&self, keys: &[String]) -> StorageResult<()> {
        self.check("remove_batch")?;
        self.inner.remove_batch(keys)
    }

    fn add_on_change(&self, callback: ChangeCallback) -> Subscription {
        self.inner.add_on_change(callback)
    }
}

impl<B: SecureBackend> SecureBackend for FailingBackend<B> {
    fn set_access_control(&self, level: AccessControl) -> StorageResult<()> {
        self.check("set_access_control")?;
        self.inner.set_access_control(level)
    }

    fn set_shared_access_group(&self, group: &str) -> StorageResult<()> {
        self.check("set_shared_access_group")?;
        self.inner.set_shared_access_group(group)
    }

    fn set_biometric(&self, key: &str, value: &str) -> StorageResult<()> {
        self.check("set_biometric")?;
        self.inner.set_biometric(key, value)
    }

    fn get_biometric(&self, key: &str) -> StorageResult<Option<String>> {
        self.check("get_biometric")?;
        self.inner.get_biometric(key)
    }

    fn delete_biometric(&self, key: &str) -> StorageResult<()> {
        self.check("delete_biometric")?;
        self.inner.delete_biometric(key)
    }

    fn has_biometric(&self, key: &str) -> StorageResult<bool> {
        self.check("has_biometric")?;
        self.inner.has_biometric(key)
    }

    fn clear_biometric(&self) -> StorageResult<()> {
        self.check("clear_biometric")?;
        self.inner.clear_biometric()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_calls_in_order() {
        let backend = RecordingBackend::memory();
        backend.set("a", "1").unwrap();
        backend.get("a").unwrap();
        backend.remove_batch(&["a".to_string()]).unwrap();

        assert_eq!(
            backend.calls(),
            vec![
                Call::Set {
                    key: "a".into(),
                    value: "1".into()
                },
                Call::Get { key: "a".into() },
                Call::RemoveBatch {
                    keys: vec!["a".into()]
                },
            ]
        );
        assert_eq!(backend.writes().len(), 2);
        assert_eq!(backend.reads(), 1);

        backend.reset();
        assert!(backend.calls().is_empty());
    }

    #[test]
    fn armed_operations_fail_until_healed() {
        let backend = FailingBackend::memory();
        backend.fail_on("set");
        assert!(matches!(
            backend.set("a", "1"),
            Err(StorageError::Unavailable(_))
        ));
        assert!(backend.get("a").unwrap().is_none());

        backend.heal();
        backend.set("a", "1").unwrap();
        assert_eq!(backend.get("a").unwrap().as_deref(), Some("1"));
    }
}
