//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, namespaces, raw values and typed records.

use proptest::prelude::*;
use serde::{Deserialize, Serialize};

/// Strategy for item keys that never contain the default separator.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_.-]{0,31}").expect("Invalid regex")
}

/// Strategy for namespace names.
pub fn namespace_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for arbitrary raw values, including the empty string.
pub fn raw_value_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        any::<String>(),
        prop::string::string_regex("[ -~]{0,64}").expect("Invalid regex"),
    ]
}

/// Strategy for TTLs in milliseconds (always positive).
pub fn ttl_ms_strategy() -> impl Strategy<Value = u64> {
    1u64..=86_400_000
}

/// A small serde record used for typed round-trip properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Age in years.
    pub age: u32,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Optional score.
    pub score: Option<i64>,
}

/// Strategy for [`Profile`] values.
pub fn profile_strategy() -> impl Strategy<Value = Profile> {
    (
        any::<String>(),
        any::<u32>(),
        prop::collection::vec("[a-z]{1,8}", 0..4),
        any::<Option<i64>>(),
    )
        .prop_map(|(name, age, tags, score)| Profile {
            name,
            age,
            tags,
            score,
        })
}

/// Strategy for a list of distinct keys.
pub fn distinct_keys_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(key_strategy(), 1..=max.max(1))
        .prop_map(|keys| keys.into_iter().collect())
}
