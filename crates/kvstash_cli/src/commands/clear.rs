//! Clear command implementation.

use super::store::DataDir;
use kvstash_core::Scope;

/// Clears a namespace, a scope, or every stored scope.
pub fn run(
    data: &DataDir,
    scope: Scope,
    namespace: Option<&str>,
    all: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if all {
        for scope in data.scopes() {
            data.storage.clear(scope)?;
        }
        if data.require(Scope::Encrypted).is_ok() {
            data.storage.clear_biometric()?;
        }
        tracing::info!("cleared all scopes");
        return Ok(());
    }

    data.require(scope)?;
    match namespace {
        Some(namespace) => {
            data.storage.clear_namespace(namespace, scope)?;
            tracing::info!(namespace, %scope, "cleared namespace");
        }
        None => {
            data.storage.clear(scope)?;
            tracing::info!(%scope, "cleared scope");
        }
    }
    Ok(())
}
