//! # kvstash Storage
//!
//! Raw key-value backend contract and adapters for kvstash.
//!
//! This crate provides the lowest-level storage abstraction for kvstash.
//! Backends are **opaque string stores** - they do not interpret the values
//! they hold. Typed items, TTL envelopes, caching and migrations all live in
//! `kvstash_core`.
//!
//! ## Design Principles
//!
//! - Backends are synchronous key-value stores (get, set, remove, batch)
//! - No knowledge of codecs, envelopes or migration markers
//! - Must be `Send + Sync`; each backend serializes its own internal access
//! - Changes are reported through [`StorageBackend::add_on_change`], where an
//!   empty key means the whole store changed
//!
//! ## Available Backends
//!
//! - [`MemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - Persistent storage in a JSON document
//! - [`EncryptedBackend`] - AES-256-GCM values over any inner backend, with a
//!   biometric-gated sub-store
//!
//! ## Example
//!
//! ```rust
//! use kvstash_storage::{MemoryBackend, StorageBackend};
//!
//! let backend = MemoryBackend::new();
//! backend.set("greeting", "hello world").unwrap();
//! assert_eq!(backend.get("greeting").unwrap().as_deref(), Some("hello world"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod encrypted;
mod error;
mod file;
mod listeners;
mod memory;

pub use backend::{
    AccessControl, ChangeCallback, SecureBackend, StorageBackend, Subscription, MISSING_VALUE,
};
pub use encrypted::{EncryptedBackend, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use listeners::ChangeListeners;
pub use memory::MemoryBackend;
