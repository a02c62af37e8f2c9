//! Read-through cache of raw values.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Last known raw value per key for one scope.
///
/// An entry of `None` records a confirmed absence, so a miss on an absent
/// key is not re-fetched while the entry stands.
#[derive(Debug, Default)]
pub(crate) struct ReadCache {
    entries: Mutex<HashMap<String, Option<String>>>,
}

impl ReadCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns `Some(entry)` on a hit, `None` on a miss.
    pub(crate) fn get(&self, key: &str) -> Option<Option<String>> {
        self.entries.lock().get(key).cloned()
    }

    pub(crate) fn put(&self, key: &str, raw: Option<String>) {
        self.entries.lock().insert(key.to_string(), raw);
    }

    pub(crate) fn invalidate(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub(crate) fn clear(&self) {
        self.entries.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_hit_and_absence() {
        let cache = ReadCache::new();
        assert_eq!(cache.get("a"), None);

        cache.put("a", Some("1".into()));
        cache.put("b", None);
        assert_eq!(cache.get("a"), Some(Some("1".into())));
        assert_eq!(cache.get("b"), Some(None));
    }

    #[test]
    fn invalidate_and_clear() {
        let cache = ReadCache::new();
        cache.put("a", Some("1".into()));
        cache.put("b", Some("2".into()));

        cache.invalidate("a");
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
