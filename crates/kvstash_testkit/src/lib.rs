//! # kvstash Testkit
//!
//! Test utilities for kvstash.
//!
//! This crate provides:
//! - Call-recording and fault-injecting backend wrappers
//! - Temporary file-backed stores and deterministic encryption keys
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use kvstash_storage::StorageBackend;
//! use kvstash_testkit::prelude::*;
//!
//! let backend = RecordingBackend::memory();
//! backend.set("a", "1").unwrap();
//! assert_eq!(backend.writes().len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backends;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backends::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use backends::*;
pub use fixtures::*;
pub use generators::*;
