//! Storage configuration.

use crate::clock::{Clock, SystemClock};
use kvstash_storage::AccessControl;
use std::sync::Arc;

/// Default separator placed between a namespace and an item key.
pub const DEFAULT_NAMESPACE_SEPARATOR: &str = ":";

/// Default reserved key holding the applied migration version.
pub const DEFAULT_MIGRATION_VERSION_KEY: &str = "__kvstash_migration_version__";

/// Configuration for opening a [`Storage`](crate::Storage).
#[derive(Debug, Clone)]
pub struct Config {
    /// Separator between a namespace and an item key.
    pub namespace_separator: String,

    /// Reserved raw key holding the applied migration version in each scope.
    pub migration_version_key: String,

    /// Access-control level applied to encrypted writes by default.
    pub access_control: AccessControl,

    /// Shared access group applied to the encrypted backend on open.
    pub shared_access_group: Option<String>,

    /// Time source for TTL expiry.
    pub clock: Arc<dyn Clock>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace_separator: DEFAULT_NAMESPACE_SEPARATOR.to_string(),
            migration_version_key: DEFAULT_MIGRATION_VERSION_KEY.to_string(),
            access_control: AccessControl::default(),
            shared_access_group: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace separator.
    #[must_use]
    pub fn namespace_separator(mut self, separator: impl Into<String>) -> Self {
        self.namespace_separator = separator.into();
        self
    }

    /// Sets the reserved migration version key.
    #[must_use]
    pub fn migration_version_key(mut self, key: impl Into<String>) -> Self {
        self.migration_version_key = key.into();
        self
    }

    /// Sets the default access-control level for encrypted writes.
    #[must_use]
    pub const fn access_control(mut self, level: AccessControl) -> Self {
        self.access_control = level;
        self
    }

    /// Sets the shared access group for the encrypted backend.
    #[must_use]
    pub fn shared_access_group(mut self, group: impl Into<String>) -> Self {
        self.shared_access_group = Some(group.into());
        self
    }

    /// Sets the time source used for TTL expiry.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the fully-qualified key for `key` under `namespace`.
    #[must_use]
    pub fn qualify(&self, namespace: Option<&str>, key: &str) -> String {
        match namespace {
            Some(ns) => format!("{ns}{}{key}", self.namespace_separator),
            None => key.to_string(),
        }
    }

    /// Returns the raw-key prefix shared by every key in `namespace`.
    #[must_use]
    pub fn namespace_prefix(&self, namespace: &str) -> String {
        format!("{namespace}{}", self.namespace_separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.namespace_separator, ":");
        assert_eq!(config.migration_version_key, DEFAULT_MIGRATION_VERSION_KEY);
        assert_eq!(config.access_control, AccessControl::WhenUnlocked);
        assert!(config.shared_access_group.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .namespace_separator("/")
            .migration_version_key("schema")
            .access_control(AccessControl::AfterFirstUnlock)
            .shared_access_group("group.app")
            .clock(Arc::new(ManualClock::new(7)));

        assert_eq!(config.namespace_separator, "/");
        assert_eq!(config.migration_version_key, "schema");
        assert_eq!(config.access_control, AccessControl::AfterFirstUnlock);
        assert_eq!(config.shared_access_group.as_deref(), Some("group.app"));
        assert_eq!(config.clock.now_ms(), 7);
    }

    #[test]
    fn qualify_keys() {
        let config = Config::default();
        assert_eq!(config.qualify(Some("user"), "name"), "user:name");
        assert_eq!(config.qualify(None, "name"), "name");
        assert_eq!(config.namespace_prefix("user"), "user:");
    }
}
