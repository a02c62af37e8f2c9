//! Listing commands: keys and dump.

use super::store::DataDir;
use kvstash_core::Scope;
use std::collections::BTreeMap;

/// Prints the keys of `scope`, optionally only those under `namespace`.
pub fn keys(
    data: &DataDir,
    scope: Scope,
    namespace: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    data.require(scope)?;
    let prefix = namespace.map(|ns| data.storage.config().namespace_prefix(ns));
    let mut keys = data.storage.keys(scope)?;
    keys.sort();
    for key in keys
        .iter()
        .filter(|key| prefix.as_deref().map_or(true, |p| key.starts_with(p)))
    {
        println!("{key}");
    }
    Ok(())
}

/// Prints every entry of `scope` as text or JSON.
pub fn dump(data: &DataDir, scope: Scope, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    data.require(scope)?;
    let entries: BTreeMap<String, String> = data.storage.get_all(scope)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            for (key, value) in &entries {
                println!("{key} = {value}");
            }
            println!("({} entries)", entries.len());
        }
    }
    Ok(())
}
