//! # kvstash Core
//!
//! Orchestration layer over three key-value backends.
//!
//! This crate provides:
//! - Typed storage items with defaults, codecs, validation and recovery
//! - Lazy TTL expiry
//! - A per-scope read-through cache and change notification bus
//! - Write coalescing for the encrypted scope
//! - Multi-key batch operations with a per-item fallback
//! - Transactions with snapshot rollback
//! - Versioned migrations with a persisted version marker
//!
//! All state lives in a [`Storage`] context; there are no globals.
//!
//! ## Example
//!
//! ```rust
//! use kvstash_core::{Scope, Storage};
//! use std::time::Duration;
//!
//! let storage = Storage::open_in_memory().unwrap();
//! let session = storage
//!     .item("token", Scope::Encrypted, String::new())
//!     .namespace("session")
//!     .ttl(Duration::from_secs(3600))
//!     .coalesce_writes(true)
//!     .build()
//!     .unwrap();
//!
//! session.set("abc".to_string()).unwrap();
//! assert_eq!(session.get().unwrap().as_str(), "abc");
//!
//! // The coalesced write reaches the backend when deferred work runs.
//! storage.run_microtasks();
//! assert!(storage.has("session:token", Scope::Encrypted).unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod cache;
mod clock;
mod codec;
mod config;
mod envelope;
mod error;
mod item;
mod migration;
mod notify;
mod pending;
mod scope;
mod storage;
mod transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{Codec, CodecError, FnCodec, JsonCodec, StringCodec};
pub use config::{Config, DEFAULT_MIGRATION_VERSION_KEY, DEFAULT_NAMESPACE_SEPARATOR};
pub use envelope::StoredEnvelope;
pub use error::{CoreError, CoreResult};
pub use item::{ItemBuilder, ItemSubscription, Recovery, SetValue, StorageItem, Validator};
pub use migration::{MigrationContext, MigrationFn, MigrationVersion};
pub use notify::Listener;
pub use pending::Microtasks;
pub use scope::Scope;
pub use storage::{KeySubscription, Storage};
pub use transaction::Transaction;

pub use kvstash_storage::AccessControl;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
