//! Benchmark utilities.

use kvstash_core::{CoreResult, Storage};
use kvstash_storage::{EncryptedBackend, EncryptionKey, MemoryBackend, StorageBackend};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A small record stored by the item benchmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Theme name.
    pub theme: String,
    /// Font size in points.
    pub font_size: u32,
    /// Enabled feature flags.
    pub flags: Vec<String>,
}

impl Settings {
    /// Creates a settings value that differs per `seed`.
    pub fn sample(seed: u32) -> Self {
        Self {
            theme: format!("theme-{}", seed % 4),
            font_size: 10 + seed % 8,
            flags: (0..seed % 5).map(|i| format!("flag-{i}")).collect(),
        }
    }
}

/// Generates a random alphanumeric string of `len` characters.
pub fn random_value(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Generates `count` distinct keys with the given prefix.
pub fn keys(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}-{i}")).collect()
}

/// Returns an encrypted backend over memory with a fresh key.
pub fn encrypted_memory() -> Arc<EncryptedBackend> {
    let inner: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
    Arc::new(EncryptedBackend::new(inner, EncryptionKey::generate()))
}

/// Opens an in-memory storage context.
pub fn storage() -> CoreResult<Storage> {
    Storage::open_in_memory()
}
