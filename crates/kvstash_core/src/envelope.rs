//! TTL envelopes.
//!
//! When an item in a persistent or encrypted scope has a TTL, its encoded
//! payload is wrapped as
//! `{"__kvstashEnvelope":true,"expiresAt":<ms>,"payload":"<encoded>"}`.
//! Envelopes are recognized lazily on read; anything else is a plain payload.

use serde::{Deserialize, Serialize};

const ENVELOPE_MARKER: &str = "\"__kvstashEnvelope\"";

/// Encoded payload with an absolute expiry time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEnvelope {
    #[serde(rename = "__kvstashEnvelope")]
    marker: bool,
    /// Expiry time in milliseconds since the Unix epoch.
    #[serde(rename = "expiresAt")]
    pub expires_at: u64,
    /// The item's encoded value.
    pub payload: String,
}

impl StoredEnvelope {
    /// Creates an envelope.
    pub fn new(expires_at: u64, payload: impl Into<String>) -> Self {
        Self {
            marker: true,
            expires_at,
            payload: payload.into(),
        }
    }

    /// Serializes the envelope to its raw form.
    #[must_use]
    pub fn to_raw(&self) -> String {
        // A struct of a bool, an integer and a string always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parses `raw` as an envelope, returning `None` for plain payloads.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if !raw.starts_with('{') || !raw.contains(ENVELOPE_MARKER) {
            return None;
        }
        serde_json::from_str::<Self>(raw)
            .ok()
            .filter(|envelope| envelope.marker)
    }

    /// Returns true once `now_ms` has reached the expiry time.
    #[must_use]
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let envelope = StoredEnvelope::new(1_000, "42");
        let raw = envelope.to_raw();
        assert_eq!(StoredEnvelope::parse(&raw), Some(envelope));
    }

    #[test]
    fn plain_payloads_are_not_envelopes() {
        assert!(StoredEnvelope::parse("42").is_none());
        assert!(StoredEnvelope::parse(r#"{"expiresAt":1,"payload":"x"}"#).is_none());
        assert!(StoredEnvelope::parse(r#"{"__kvstashEnvelope":false,"expiresAt":1,"payload":"x"}"#).is_none());
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let envelope = StoredEnvelope::new(100, "x");
        assert!(!envelope.is_expired(99));
        assert!(envelope.is_expired(100));
        assert!(envelope.is_expired(101));
    }
}
