//! Opening the stores of a data directory.

use kvstash_core::{Config, Scope, Storage};
use kvstash_storage::{EncryptedBackend, EncryptionKey, FileBackend, MemoryBackend};
use std::path::Path;
use std::sync::Arc;

/// File holding the persistent scope.
pub const PERSISTENT_FILE: &str = "persistent.json";
/// File holding the encrypted scope.
pub const SECURE_FILE: &str = "secure.json";
/// File holding the biometric sub-store.
pub const BIOMETRIC_FILE: &str = "biometric.json";

const KEY_SALT: &[u8] = b"kvstash-cli-v1";

/// A storage context over a data directory.
pub struct DataDir {
    /// The opened context.
    pub storage: Storage,
    secure: bool,
}

impl DataDir {
    /// Opens the data directory at `path`.
    ///
    /// The encrypted scope is only available when a passphrase is given.
    pub fn open(path: &Path, passphrase: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let persistent = Arc::new(FileBackend::open_with_create_dirs(&path.join(PERSISTENT_FILE))?);

        let (encrypted, secure) = match passphrase {
            Some(passphrase) => {
                let key = EncryptionKey::derive_from_passphrase(passphrase.as_bytes(), KEY_SALT)?;
                let inner = Arc::new(FileBackend::open_with_create_dirs(&path.join(SECURE_FILE))?);
                let biometric =
                    Arc::new(FileBackend::open_with_create_dirs(&path.join(BIOMETRIC_FILE))?);
                (
                    EncryptedBackend::with_biometric_store(inner, biometric, key),
                    true,
                )
            }
            None => (
                EncryptedBackend::new(Arc::new(MemoryBackend::new()), EncryptionKey::generate()),
                false,
            ),
        };

        tracing::debug!(path = %path.display(), secure, "opened data directory");
        let storage = Storage::open_with_backends(Config::default(), persistent, Arc::new(encrypted))?;
        Ok(Self { storage, secure })
    }

    /// Checks that `scope` is backed by a file in this directory.
    pub fn require(&self, scope: Scope) -> Result<(), Box<dyn std::error::Error>> {
        match scope {
            Scope::Ephemeral => Err("the ephemeral scope is not stored on disk".into()),
            Scope::Encrypted if !self.secure => {
                Err("the encrypted scope needs --passphrase or KVSTASH_PASSPHRASE".into())
            }
            _ => Ok(()),
        }
    }

    /// Returns the scopes stored in this directory.
    pub fn scopes(&self) -> Vec<Scope> {
        if self.secure {
            vec![Scope::Persistent, Scope::Encrypted]
        } else {
            vec![Scope::Persistent]
        }
    }
}
