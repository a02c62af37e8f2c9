//! Inspect command implementation.

use super::store::DataDir;
use kvstash_core::{Clock, Scope, StoredEnvelope, SystemClock};
use serde::Serialize;
use std::path::Path;

/// Data directory inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Data directory path.
    pub path: String,
    /// Per-scope statistics.
    pub scopes: Vec<ScopeStats>,
}

/// Statistics for a single scope.
#[derive(Debug, Serialize)]
pub struct ScopeStats {
    /// Scope name.
    pub scope: String,
    /// Number of stored keys, including the migration marker.
    pub key_count: usize,
    /// Number of values wrapped in a TTL envelope.
    pub ttl_count: usize,
    /// Number of TTL envelopes that have already expired.
    pub expired_count: usize,
    /// Total length of stored values in bytes.
    pub value_bytes: usize,
    /// Last applied migration version.
    pub migration_version: u64,
}

/// Runs the inspect command.
pub fn run(data: &DataDir, path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let now = SystemClock.now_ms();
    let mut result = InspectResult {
        path: path.display().to_string(),
        scopes: Vec::new(),
    };

    for scope in data.scopes() {
        result.scopes.push(scope_stats(data, scope, now)?);
    }

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            println!("Data directory: {}", result.path);
            for stats in &result.scopes {
                println!();
                println!("[{}]", stats.scope);
                println!("  Keys:              {}", stats.key_count);
                println!("  Value bytes:       {}", stats.value_bytes);
                println!(
                    "  TTL entries:       {} ({} expired)",
                    stats.ttl_count, stats.expired_count
                );
                println!("  Migration version: {}", stats.migration_version);
            }
            if data.require(Scope::Encrypted).is_err() {
                println!();
                println!("(encrypted scope skipped: no passphrase)");
            }
        }
    }
    Ok(())
}

fn scope_stats(data: &DataDir, scope: Scope, now: u64) -> Result<ScopeStats, Box<dyn std::error::Error>> {
    let entries = data.storage.get_all(scope)?;
    let mut stats = ScopeStats {
        scope: scope.to_string(),
        key_count: entries.len(),
        ttl_count: 0,
        expired_count: 0,
        value_bytes: 0,
        migration_version: data.storage.current_version(scope)?,
    };

    for value in entries.values() {
        stats.value_bytes += value.len();
        if let Some(envelope) = StoredEnvelope::parse(value) {
            stats.ttl_count += 1;
            if envelope.is_expired(now) {
                stats.expired_count += 1;
            }
        }
    }
    Ok(stats)
}
