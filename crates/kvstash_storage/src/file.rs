//! File-based storage backend for persistent storage.

use crate::backend::{check_batch_lengths, ChangeCallback, StorageBackend, Subscription};
use crate::error::{StorageError, StorageResult};
use crate::listeners::ChangeListeners;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A file-based storage backend.
///
/// All entries are kept in memory and mirrored to a single JSON object on
/// disk. Data survives process restarts.
///
/// # Durability
///
/// Every mutation rewrites the document into a sibling temporary file,
/// syncs it and renames it over the original, so a crash leaves either the
/// old or the new document. Batch operations rewrite once.
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
/// Internal locking ensures consistent access.
///
/// # Example
///
/// ```no_run
/// use kvstash_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let backend = FileBackend::open(Path::new("prefs.json")).unwrap();
/// backend.set("theme", "\"dark\"").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    listeners: Arc<ChangeListeners>,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// A missing or empty file starts an empty store; the file is only
    /// created on the first mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or does not
    /// contain a JSON object of strings.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let entries = match fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "opened file backend");

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
            listeners: ChangeListeners::new(),
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StorageResult<()> {
        let document = serde_json::to_vec_pretty(entries)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&document)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Applies `mutate` to the entries and persists the result.
    ///
    /// The in-memory map is only replaced once the document is on disk.
    fn mutate(&self, mutate: impl FnOnce(&mut BTreeMap<String, String>)) -> StorageResult<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        mutate(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

impl StorageBackend for FileBackend {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })?;
        self.listeners.notify(key, Some(value));
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        if !self.entries.read().contains_key(key) {
            return Ok(());
        }
        self.mutate(|entries| {
            entries.remove(key);
        })?;
        self.listeners.notify(key, None);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.mutate(BTreeMap::clear)?;
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
        self.mutate(|entries| {
            for (key, value) in keys.iter().zip(values) {
                entries.insert(key.clone(), value.clone());
            }
        })?;
        for (key, value) in keys.iter().zip(values) {
            self.listeners.notify(key, Some(value));
        }
        Ok(())
    }

    fn remove_batch(&self, keys: &[String]) -> StorageResult<()> {
        self.mutate(|entries| {
            for key in keys {
                entries.remove(key);
            }
        })?;
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
    use tempfile::TempDir;

    fn temp_backend() -> (TempDir, FileBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(&dir.path().join("store.json")).unwrap();
        (dir, backend)
    }

    #[test]
    fn file_open_missing_is_empty() {
        let (_dir, backend) = temp_backend();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(!backend.path().exists());
    }

    #[test]
    fn file_data_survives_reopen() {
        let (dir, backend) = temp_backend();
        backend.set("a", "1").unwrap();
        backend.set("b", "").unwrap();
        drop(backend);

        let reopened = FileBackend::open(&dir.path().join("store.json")).unwrap();
        assert_eq!(reopened.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get("b").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn file_remove_and_clear_persist() {
        let (dir, backend) = temp_backend();
        backend.set("a", "1").unwrap();
        backend.set("b", "2").unwrap();
        backend.remove("a").unwrap();

        let reopened = FileBackend::open(&dir.path().join("store.json")).unwrap();
        assert_eq!(reopened.keys().unwrap(), vec!["b".to_string()]);

        backend.clear().unwrap();
        let reopened = FileBackend::open(&dir.path().join("store.json")).unwrap();
        assert_eq!(reopened.size().unwrap(), 0);
    }

    #[test]
    fn file_batch_operations() {
        let (_dir, backend) = temp_backend();
        let keys = vec!["x".to_string(), "y".to_string()];
        backend
            .set_batch(&keys, &["1".to_string(), "2".to_string()])
            .unwrap();
        assert_eq!(backend.size().unwrap(), 2);

        backend.remove_batch(&keys[..1]).unwrap();
        assert_eq!(backend.keys().unwrap(), vec!["y".to_string()]);
    }

    #[test]
    fn file_corrupted_document_fails_to_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        let result = FileBackend::open(&path);
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
    }

    #[test]
    fn file_open_with_create_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("store.json");
        let backend = FileBackend::open_with_create_dirs(&path).unwrap();
        backend.set("k", "v").unwrap();
        assert!(path.exists());
    }
}
