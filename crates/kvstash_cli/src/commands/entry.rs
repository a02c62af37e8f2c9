//! Single-key commands: get, set, remove.

use super::store::DataDir;
use kvstash_core::{Clock, Scope, StoredEnvelope, SystemClock};
use std::time::Duration;

/// Prints the raw value of `key`.
///
/// With `unwrap`, a TTL envelope is replaced by its payload, and an expired
/// envelope is reported as missing.
pub fn get(
    data: &DataDir,
    key: &str,
    scope: Scope,
    unwrap: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    data.require(scope)?;
    let raw = data
        .storage
        .get_raw(key, scope)?
        .ok_or_else(|| format!("key {key:?} not found in {scope} scope"))?;

    if !unwrap {
        println!("{raw}");
        return Ok(());
    }
    match StoredEnvelope::parse(&raw) {
        Some(envelope) if envelope.is_expired(SystemClock.now_ms()) => {
            Err(format!("key {key:?} has expired").into())
        }
        Some(envelope) => {
            println!("{}", envelope.payload);
            Ok(())
        }
        None => {
            println!("{raw}");
            Ok(())
        }
    }
}

/// Stores `value` under `key`, optionally wrapped in a TTL envelope.
pub fn set(
    data: &DataDir,
    key: &str,
    value: &str,
    scope: Scope,
    ttl: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    data.require(scope)?;
    let raw = match ttl {
        Some(ttl) if ttl.is_zero() => return Err("ttl must be positive".into()),
        Some(ttl) => {
            let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
            StoredEnvelope::new(SystemClock.now_ms().saturating_add(ttl_ms), value).to_raw()
        }
        None => value.to_string(),
    };
    data.storage.set_raw(key, &raw, scope)?;
    tracing::info!(key, %scope, "value stored");
    Ok(())
}

/// Removes `key`.
pub fn remove(data: &DataDir, key: &str, scope: Scope) -> Result<(), Box<dyn std::error::Error>> {
    data.require(scope)?;
    if !data.storage.has(key, scope)? {
        return Err(format!("key {key:?} not found in {scope} scope").into());
    }
    data.storage.remove_raw(key, scope)?;
    tracing::info!(key, %scope, "value removed");
    Ok(())
}
