//! Test fixtures and backend helpers.
//!
//! Provides convenience functions for building backends over temporary
//! directories and deterministic encryption keys.

use kvstash_storage::{EncryptedBackend, EncryptionKey, FileBackend, MemoryBackend, StorageBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Salt used by [`test_key`].
pub const TEST_SALT: &[u8] = b"kvstash-testkit";

/// Returns a deterministic encryption key for tests.
///
/// # Panics
///
/// Never panics; derivation from a fixed passphrase cannot fail.
#[must_use]
pub fn test_key() -> EncryptionKey {
    EncryptionKey::derive_from_passphrase(b"correct horse battery staple", TEST_SALT)
        .expect("Failed to derive test key")
}

/// Returns an encrypted backend over a fresh memory store.
///
/// The inner store is returned too so tests can inspect ciphertext.
#[must_use]
pub fn encrypted_memory() -> (Arc<MemoryBackend>, Arc<EncryptedBackend>) {
    let inner = Arc::new(MemoryBackend::new());
    let backend = Arc::new(EncryptedBackend::new(inner.clone(), test_key()));
    (inner, backend)
}

/// A pair of file-backed stores in a temporary directory.
///
/// The directory is removed when the fixture is dropped.
pub struct TempStores {
    /// The persistent store.
    pub persistent: Arc<FileBackend>,
    /// The encrypted store, sealed with [`test_key`].
    pub encrypted: Arc<EncryptedBackend>,
    temp_dir: TempDir,
}

impl TempStores {
    /// Creates both stores under a new temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or files cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let (persistent, encrypted) = open_stores(&temp_dir);
        Self {
            persistent,
            encrypted,
            temp_dir,
        }
    }

    /// Reopens both stores from disk, as after a process restart.
    ///
    /// # Panics
    ///
    /// Panics if the files cannot be read.
    #[must_use]
    pub fn reopen(self) -> Self {
        let (persistent, encrypted) = open_stores(&self.temp_dir);
        Self {
            persistent,
            encrypted,
            temp_dir: self.temp_dir,
        }
    }

    /// Returns the path of the persistent document.
    #[must_use]
    pub fn persistent_path(&self) -> PathBuf {
        self.temp_dir.path().join("persistent.json")
    }

    /// Returns the path of the encrypted document.
    #[must_use]
    pub fn encrypted_path(&self) -> PathBuf {
        self.temp_dir.path().join("secure.json")
    }
}

impl Default for TempStores {
    fn default() -> Self {
        Self::new()
    }
}

fn open_stores(dir: &TempDir) -> (Arc<FileBackend>, Arc<EncryptedBackend>) {
    let persistent = FileBackend::open_with_create_dirs(&dir.path().join("persistent.json"))
        .expect("Failed to open persistent store");
    let secure: Arc<dyn StorageBackend> = Arc::new(
        FileBackend::open_with_create_dirs(&dir.path().join("secure.json"))
            .expect("Failed to open secure store"),
    );
    (
        Arc::new(persistent),
        Arc::new(EncryptedBackend::new(secure, test_key())),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_stable() {
        assert_eq!(test_key().as_bytes(), test_key().as_bytes());
    }

    #[test]
    fn stores_survive_reopen() {
        let stores = TempStores::new();
        stores.persistent.set("a", "1").unwrap();
        stores.encrypted.set("b", "2").unwrap();

        let stores = stores.reopen();
        assert_eq!(stores.persistent.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(stores.encrypted.get("b").unwrap().as_deref(), Some("2"));
        assert!(stores.encrypted_path().exists());
    }

    #[test]
    fn encrypted_memory_hides_plaintext() {
        let (inner, backend) = encrypted_memory();
        backend.set("k", "plain").unwrap();
        assert_ne!(inner.get("k").unwrap().as_deref(), Some("plain"));
    }
}
