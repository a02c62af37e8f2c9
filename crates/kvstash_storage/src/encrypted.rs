//! Encrypted storage backend wrapper.
//!
//! This module provides an encrypted storage backend that wraps any other
//! backend with AES-256-GCM encryption of values at rest.
//!
//! ## Security Model
//!
//! - Each value is encrypted independently with a random nonce
//! - Stored form: `base64(nonce (12 bytes) || ciphertext || tag (16 bytes))`
//! - The key name is bound as associated data, so a ciphertext copied to
//!   another key fails authentication
//! - Keys are never stored; they must be provided by the application
//!
//! ## Biometric Sub-Store
//!
//! Values written through [`SecureBackend::set_biometric`] go to a second
//! inner backend. They never appear in [`StorageBackend::keys`] and survive
//! [`StorageBackend::clear`].

use crate::backend::{
    check_batch_lengths, AccessControl, ChangeCallback, SecureBackend, StorageBackend,
    Subscription, MISSING_VALUE,
};
use crate::error::{StorageError, StorageResult};
use crate::listeners::ChangeListeners;
use crate::memory::MemoryBackend;
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use rand::RngCore;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Encryption key for the encrypted backend.
///
/// The key is zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StorageError::Encryption(format!(
                "invalid key size: expected {KEY_SIZE}, got {}",
                bytes.len()
            )));
        }
        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// HKDF is a key derivation function, not a password hash. Use it with
    /// high-entropy passphrases (for example a generated device secret).
    ///
    /// # Errors
    ///
    /// Returns an error if HKDF expansion fails.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> StorageResult<Self> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);
        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"kvstash-value-key-v1", &mut bytes)
            .map_err(|_| StorageError::Encryption("HKDF expand failed".to_string()))?;
        Ok(Self { bytes })
    }

    /// Returns the key as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// An encrypted storage backend that wraps other backends.
///
/// Keys are stored in clear; values are encrypted with AES-256-GCM.
///
/// # Example
///
/// ```rust
/// use kvstash_storage::{EncryptedBackend, EncryptionKey, MemoryBackend, StorageBackend};
/// use std::sync::Arc;
///
/// let key = EncryptionKey::generate();
/// let backend = EncryptedBackend::new(Arc::new(MemoryBackend::new()), key);
/// backend.set("token", "s3cr3t").unwrap();
/// assert_eq!(backend.get("token").unwrap().as_deref(), Some("s3cr3t"));
/// ```
pub struct EncryptedBackend {
    inner: Arc<dyn StorageBackend>,
    biometric: Arc<dyn StorageBackend>,
    cipher: Aes256Gcm,
    access_control: RwLock<AccessControl>,
    access_group: RwLock<Option<String>>,
    listeners: Arc<ChangeListeners>,
}

impl EncryptedBackend {
    /// Creates an encrypted backend over `inner`.
    ///
    /// The biometric sub-store is kept in memory.
    pub fn new(inner: Arc<dyn StorageBackend>, key: EncryptionKey) -> Self {
        Self::with_biometric_store(inner, Arc::new(MemoryBackend::new()), key)
    }

    /// Creates an encrypted backend with an explicit biometric sub-store.
    pub fn with_biometric_store(
        inner: Arc<dyn StorageBackend>,
        biometric: Arc<dyn StorageBackend>,
        key: EncryptionKey,
    ) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
        Self {
            inner,
            biometric,
            cipher,
            access_control: RwLock::new(AccessControl::default()),
            access_group: RwLock::new(None),
            listeners: ChangeListeners::new(),
        }
    }

    /// Returns the access-control level applied to writes.
    #[must_use]
    pub fn access_control(&self) -> AccessControl {
        *self.access_control.read()
    }

    /// Returns the configured shared access group, if any.
    #[must_use]
    pub fn access_group(&self) -> Option<String> {
        self.access_group.read().clone()
    }

    fn encrypt(&self, key: &str, plaintext: &str) -> StorageResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Encryption("encryption error".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend(ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, key: &str, stored: &str) -> StorageResult<String> {
        let sealed = STANDARD
            .decode(stored)
            .map_err(|e| StorageError::Encryption(format!("invalid ciphertext encoding: {e}")))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StorageError::Encryption("ciphertext too short".to_string()));
        }

        let nonce = Nonce::from_slice(&sealed[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &sealed[NONCE_SIZE..],
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| StorageError::Encryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| StorageError::Encryption("plaintext is not UTF-8".to_string()))
    }
}

impl StorageBackend for EncryptedBackend {
    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let sealed = self.encrypt(key, value)?;
        self.inner.set(key, &sealed)?;
        self.listeners.notify(key, Some(value));
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        self.inner
            .get(key)?
            .map(|sealed| self.decrypt(key, &sealed))
            .transpose()
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key)?;
        self.listeners.notify(key, None);
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        self.inner.clear()?;
        self.listeners.notify("", None);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.inner.keys()
    }

    fn has(&self, key: &str) -> StorageResult<bool> {
        self.inner.has(key)
    }

    fn size(&self) -> StorageResult<usize> {
        self.inner.size()
    }

    fn set_batch(&self, keys: &[String], values: &[String]) -> StorageResult<()> {
        check_batch_lengths(keys, values)?;
        let sealed = keys
            .iter()
            .zip(values)
            .map(|(key, value)| self.encrypt(key, value))
            .collect::<StorageResult<Vec<_>>>()?;
        self.inner.set_batch(keys, &sealed)?;
        for (key, value) in keys.iter().zip(values) {
            self.listeners.notify(key, Some(value));
        }
        Ok(())
    }

    fn get_batch(&self, keys: &[String]) -> StorageResult<Vec<String>> {
        let sealed = self.inner.get_batch(keys)?;
        keys.iter()
            .zip(sealed)
            .map(|(key, stored)| {
                if stored == MISSING_VALUE {
                    Ok(stored)
                } else {
                    self.decrypt(key, &stored)
                }
            })
            .collect()
    }

    fn remove_batch(&self, keys: &[String]) -> StorageResult<()> {
        self.inner.remove_batch(keys)?;
        for key in keys {
            self.listeners.notify(key, None);
        }
        Ok(())
    }

    fn add_on_change(&self, callback: ChangeCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }
}

impl SecureBackend for EncryptedBackend {
    fn set_access_control(&self, level: AccessControl) -> StorageResult<()> {
        *self.access_control.write() = level;
        Ok(())
    }

    fn set_shared_access_group(&self, group: &str) -> StorageResult<()> {
        *self.access_group.write() = Some(group.to_string());
        Ok(())
    }

    fn set_biometric(&self, key: &str, value: &str) -> StorageResult<()> {
        let sealed = self.encrypt(key, value)?;
        self.biometric.set(key, &sealed)
    }

    fn get_biometric(&self, key: &str) -> StorageResult<Option<String>> {
        self.biometric
            .get(key)?
            .map(|sealed| self.decrypt(key, &sealed))
            .transpose()
    }

    fn delete_biometric(&self, key: &str) -> StorageResult<()> {
        self.biometric.remove(key)
    }

    fn has_biometric(&self, key: &str) -> StorageResult<bool> {
        self.biometric.has(key)
    }

    fn clear_biometric(&self) -> StorageResult<()> {
        self.biometric.clear()
    }
}

impl std::fmt::Debug for EncryptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBackend")
            .field("access_control", &self.access_control())
            .field("access_group", &self.access_group())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_inner() -> (Arc<MemoryBackend>, EncryptedBackend) {
        let inner = Arc::new(MemoryBackend::new());
        let key = EncryptionKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        let backend = EncryptedBackend::new(inner.clone(), key);
        (inner, backend)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let (_inner, backend) = backend_with_inner();
        backend.set("k", "Hello, encrypted world!").unwrap();
        assert_eq!(
            backend.get("k").unwrap().as_deref(),
            Some("Hello, encrypted world!")
        );
    }

    #[test]
    fn inner_store_never_sees_plaintext() {
        let (inner, backend) = backend_with_inner();
        backend.set("k", "plaintext-marker").unwrap();

        let stored = inner.get("k").unwrap().unwrap();
        assert!(!stored.contains("plaintext-marker"));
    }

    #[test]
    fn tampered_data_fails() {
        let (inner, backend) = backend_with_inner();
        backend.set("k", "Secret data").unwrap();

        let stored = inner.get("k").unwrap().unwrap();
        let mut raw = STANDARD.decode(stored).unwrap();
        raw[NONCE_SIZE + 1] ^= 0xFF;
        inner.set("k", &STANDARD.encode(raw)).unwrap();

        assert!(matches!(backend.get("k"), Err(StorageError::Encryption(_))));
    }

    #[test]
    fn ciphertext_is_bound_to_its_key() {
        let (inner, backend) = backend_with_inner();
        backend.set("a", "value").unwrap();
        let stored = inner.get("a").unwrap().unwrap();
        inner.set("b", &stored).unwrap();

        assert!(backend.get("b").is_err());
    }

    #[test]
    fn different_keys_fail() {
        let inner = Arc::new(MemoryBackend::new());
        let key1 = EncryptionKey::from_bytes(&[0x42u8; KEY_SIZE]).unwrap();
        let key2 = EncryptionKey::from_bytes(&[0x43u8; KEY_SIZE]).unwrap();
        let writer = EncryptedBackend::new(inner.clone(), key1);
        let reader = EncryptedBackend::new(inner, key2);

        writer.set("k", "Secret data").unwrap();
        assert!(reader.get("k").is_err());
    }

    #[test]
    fn derived_keys_are_deterministic() {
        let a = EncryptionKey::derive_from_passphrase(b"passphrase", b"salt").unwrap();
        let b = EncryptionKey::derive_from_passphrase(b"passphrase", b"salt").unwrap();
        let c = EncryptionKey::derive_from_passphrase(b"passphrase", b"other").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn invalid_key_size_rejected() {
        assert!(EncryptionKey::from_bytes(&[0u8; 16]).is_err());
    }

    #[test]
    fn get_batch_keeps_missing_sentinel() {
        let (_inner, backend) = backend_with_inner();
        backend.set("a", "1").unwrap();

        let values = backend
            .get_batch(&["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(values, vec!["1".to_string(), MISSING_VALUE.to_string()]);
    }

    #[test]
    fn biometric_store_is_separate() {
        let (_inner, backend) = backend_with_inner();
        backend.set_biometric("pin", "1234").unwrap();

        assert_eq!(backend.get_biometric("pin").unwrap().as_deref(), Some("1234"));
        assert!(backend.get("pin").unwrap().is_none());
        assert!(backend.keys().unwrap().is_empty());

        backend.clear().unwrap();
        assert!(backend.has_biometric("pin").unwrap());

        backend.clear_biometric().unwrap();
        assert!(!backend.has_biometric("pin").unwrap());
    }

    #[test]
    fn access_control_and_group_are_recorded() {
        let (_inner, backend) = backend_with_inner();
        assert_eq!(backend.access_control(), AccessControl::WhenUnlocked);

        backend
            .set_access_control(AccessControl::AfterFirstUnlockThisDeviceOnly)
            .unwrap();
        backend.set_shared_access_group("group.example").unwrap();

        assert_eq!(
            backend.access_control(),
            AccessControl::AfterFirstUnlockThisDeviceOnly
        );
        assert_eq!(backend.access_group().as_deref(), Some("group.example"));
    }
}
