//! Error types for kvstash core.

use crate::codec::CodecError;
use crate::scope::Scope;
use kvstash_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in kvstash core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A backend adapter call failed.
    #[error("{scope} backend {operation} failed: {source}")]
    Backend {
        /// Scope whose backend failed.
        scope: Scope,
        /// Backend operation that failed.
        operation: &'static str,
        /// Underlying adapter error.
        #[source]
        source: StorageError,
    },

    /// A value could not be encoded or decoded.
    #[error("codec error for key {key:?}: {source}")]
    Codec {
        /// Fully-qualified key of the item.
        key: String,
        /// Underlying codec error.
        #[source]
        source: CodecError,
    },

    /// An item or storage was configured with invalid options.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// A value was rejected by the item's validator.
    #[error("validation failed for key {key:?}")]
    Validation {
        /// Fully-qualified key of the item.
        key: String,
    },

    /// A scope value or name was not recognized.
    #[error("unknown storage scope: {value}")]
    UnknownScope {
        /// The rejected value.
        value: String,
    },

    /// An item's scope differs from the scope an operation was declared for.
    #[error("scope mismatch for key {key:?}: expected {expected}, got {actual}")]
    ScopeMismatch {
        /// Fully-qualified key of the offending item.
        key: String,
        /// Scope the operation was declared for.
        expected: Scope,
        /// Scope the item belongs to.
        actual: Scope,
    },

    /// A migration version was zero.
    #[error("invalid migration version {version}: versions must be positive")]
    InvalidMigrationVersion {
        /// The rejected version.
        version: u64,
    },

    /// A migration version was registered twice.
    #[error("migration version {version} already registered")]
    DuplicateMigration {
        /// The duplicated version.
        version: u64,
    },

    /// A migration body failed.
    #[error("migration failed: {message}")]
    MigrationFailed {
        /// Description of the failure.
        message: String,
    },
}

impl CoreError {
    /// Returns a mapper wrapping a [`StorageError`] with scope and operation.
    pub fn backend(scope: Scope, operation: &'static str) -> impl FnOnce(StorageError) -> Self {
        move |source| Self::Backend {
            scope,
            operation,
            source,
        }
    }

    /// Creates a codec error for `key`.
    pub fn codec(key: impl Into<String>, source: CodecError) -> Self {
        Self::Codec {
            key: key.into(),
            source,
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(key: impl Into<String>) -> Self {
        Self::Validation { key: key.into() }
    }

    /// Creates an unknown scope error.
    pub fn unknown_scope(value: impl ToString) -> Self {
        Self::UnknownScope {
            value: value.to_string(),
        }
    }

    /// Creates a migration failed error.
    pub fn migration_failed(message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            message: message.into(),
        }
    }
}
