//! Versioned schema migrations.
//!
//! Migrations are registered on a [`Storage`] context under a positive
//! version and applied per scope in ascending order. The applied version is
//! persisted as a decimal string under the configured reserved key of each
//! scope.
//!
//! Migrations are not wrapped in a transaction: if one fails, earlier
//! migrations stay applied and the version marker reflects only the
//! migrations that completed.
//!
//! ## Usage
//!
//! ```rust
//! use kvstash_core::{Scope, Storage};
//!
//! let storage = Storage::open_in_memory().unwrap();
//! storage
//!     .register_migration(1, |ctx| {
//!         if let Some(old) = ctx.get_raw("username")? {
//!             ctx.set_raw("user:name", &old)?;
//!             ctx.remove_raw("username")?;
//!         }
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(storage.migrate_to_latest(Scope::Persistent).unwrap(), 1);
//! ```

use crate::error::{CoreError, CoreResult};
use crate::scope::Scope;
use crate::storage::Storage;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

/// Version number for migrations.
pub type MigrationVersion = u64;

/// A migration body.
pub type MigrationFn = Arc<dyn Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync>;

/// Registered migrations, keyed by version.
#[derive(Default)]
pub(crate) struct MigrationRegistry {
    migrations: Mutex<BTreeMap<MigrationVersion, MigrationFn>>,
}

impl MigrationRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, version: MigrationVersion, apply: MigrationFn) -> CoreResult<()> {
        if version == 0 {
            return Err(CoreError::InvalidMigrationVersion { version });
        }
        let mut migrations = self.migrations.lock();
        if migrations.contains_key(&version) {
            return Err(CoreError::DuplicateMigration { version });
        }
        migrations.insert(version, apply);
        Ok(())
    }

    pub(crate) fn versions(&self) -> Vec<MigrationVersion> {
        self.migrations.lock().keys().copied().collect()
    }

    /// Returns the migrations above `current`, ascending.
    fn after(&self, current: MigrationVersion) -> Vec<(MigrationVersion, MigrationFn)> {
        self.migrations
            .lock()
            .range((Bound::Excluded(current), Bound::Unbounded))
            .map(|(version, apply)| (*version, Arc::clone(apply)))
            .collect()
    }
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}

/// Raw access to one scope while a migration runs.
pub struct MigrationContext<'a> {
    storage: &'a Storage,
    scope: Scope,
    version: MigrationVersion,
}

impl MigrationContext<'_> {
    /// Returns the scope being migrated.
    #[must_use]
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Returns the version of the running migration.
    #[must_use]
    pub fn version(&self) -> MigrationVersion {
        self.version
    }

    /// Reads a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn get_raw(&self, key: &str) -> CoreResult<Option<String>> {
        self.storage.get_raw(key, self.scope)
    }

    /// Writes a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn set_raw(&mut self, key: &str, value: &str) -> CoreResult<()> {
        self.storage.set_raw(key, value, self.scope)
    }

    /// Removes a raw value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend removal fails.
    pub fn remove_raw(&mut self, key: &str) -> CoreResult<()> {
        self.storage.remove_raw(key, self.scope)
    }

    /// Returns every key in the scope except the version marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    pub fn keys(&self) -> CoreResult<Vec<String>> {
        let marker = &self.storage.config().migration_version_key;
        let mut keys = self.storage.keys(self.scope)?;
        keys.retain(|key| key != marker);
        Ok(keys)
    }
}

impl fmt::Debug for MigrationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationContext")
            .field("scope", &self.scope)
            .field("version", &self.version)
            .finish()
    }
}

impl Storage {
    /// Registers a migration under `version`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidMigrationVersion`] for version 0 and
    /// [`CoreError::DuplicateMigration`] if `version` is taken.
    pub fn register_migration(
        &self,
        version: MigrationVersion,
        apply: impl Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    ) -> CoreResult<()> {
        self.inner.migrations.register(version, Arc::new(apply))
    }

    /// Returns the registered versions, ascending.
    #[must_use]
    pub fn registered_migrations(&self) -> Vec<MigrationVersion> {
        self.inner.migrations.versions()
    }

    /// Returns the applied version of `scope`; 0 if absent or unparsable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn current_version(&self, scope: Scope) -> CoreResult<MigrationVersion> {
        let raw = self
            .inner
            .read_raw(scope, &self.inner.config.migration_version_key)?;
        Ok(raw
            .and_then(|raw| raw.trim().parse::<MigrationVersion>().ok())
            .unwrap_or(0))
    }

    /// Applies every registered migration above the applied version of
    /// `scope`, in ascending order, advancing the marker after each one.
    ///
    /// Returns the final applied version.
    ///
    /// # Errors
    ///
    /// Returns the first failing migration's error; the marker stays at the
    /// last completed version.
    pub fn migrate_to_latest(&self, scope: Scope) -> CoreResult<MigrationVersion> {
        self.inner.flush_if_encrypted(scope)?;
        let mut current = self.current_version(scope)?;
        let pending = self.inner.migrations.after(current);
        if pending.is_empty() {
            tracing::debug!(%scope, version = current, "no pending migrations");
            return Ok(current);
        }

        let marker = self.inner.config.migration_version_key.clone();
        let mut applied = 0usize;
        for (version, apply) in pending {
            let mut ctx = MigrationContext {
                storage: self,
                scope,
                version,
            };
            if let Err(err) = apply(&mut ctx) {
                tracing::warn!(%scope, version, error = %err, "migration failed");
                return Err(err);
            }
            self.inner
                .write_raw(scope, &marker, Some(&version.to_string()))?;
            current = version;
            applied += 1;
            tracing::debug!(%scope, version, "applied migration");
        }

        tracing::info!(%scope, version = current, applied, "migrations complete");
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn rejects_zero_and_duplicates() {
        let storage = Storage::open_in_memory().unwrap();
        assert!(matches!(
            storage.register_migration(0, |_| Ok(())),
            Err(CoreError::InvalidMigrationVersion { version: 0 })
        ));
        storage.register_migration(3, |_| Ok(())).unwrap();
        assert!(matches!(
            storage.register_migration(3, |_| Ok(())),
            Err(CoreError::DuplicateMigration { version: 3 })
        ));
        assert_eq!(storage.registered_migrations(), vec![3]);
    }

    #[test]
    fn version_defaults_to_zero() {
        let storage = Storage::open_in_memory().unwrap();
        assert_eq!(storage.current_version(Scope::Persistent).unwrap(), 0);

        let key = storage.config().migration_version_key.clone();
        storage.set_raw(&key, "garbage", Scope::Persistent).unwrap();
        assert_eq!(storage.current_version(Scope::Persistent).unwrap(), 0);
    }

    #[test]
    fn runs_once_per_scope() {
        let storage = Storage::open_in_memory().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);
        storage
            .register_migration(1, move |_| {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        assert_eq!(storage.migrate_to_latest(Scope::Persistent).unwrap(), 1);
        assert_eq!(storage.migrate_to_latest(Scope::Persistent).unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        assert_eq!(storage.migrate_to_latest(Scope::Encrypted).unwrap(), 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_keeps_completed_versions() {
        let storage = Storage::open_in_memory().unwrap();
        storage
            .register_migration(1, |ctx| ctx.set_raw("a", "1"))
            .unwrap();
        storage
            .register_migration(2, |_| Err(CoreError::migration_failed("boom")))
            .unwrap();

        let err = storage.migrate_to_latest(Scope::Persistent).unwrap_err();
        assert!(matches!(err, CoreError::MigrationFailed { .. }));
        assert_eq!(storage.current_version(Scope::Persistent).unwrap(), 1);
        assert_eq!(
            storage.get_raw("a", Scope::Persistent).unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn context_keys_hide_marker() {
        let storage = Storage::open_in_memory().unwrap();
        storage.set_raw("x", "1", Scope::Ephemeral).unwrap();
        storage.register_migration(1, |_| Ok(())).unwrap();
        storage.migrate_to_latest(Scope::Ephemeral).unwrap();

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        storage
            .register_migration(2, move |ctx| {
                *s.lock() = ctx.keys()?;
                Ok(())
            })
            .unwrap();
        storage.migrate_to_latest(Scope::Ephemeral).unwrap();
        assert_eq!(*seen.lock(), vec!["x".to_string()]);
    }
}
