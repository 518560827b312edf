//! Versioned snapshot envelope.
//!
//! Persisted state is stored as UTF-8 JSON:
//!
//! ```text
//! { "state": { "fish": { "count": 3 }, "bear": { "count": 2 } }, "version": 1 }
//! ```
//!
//! The version is the only compatibility mechanism. A snapshot written under a
//! different version is treated as absent; there is no migration step.

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Storage name used when none is configured.
pub const DEFAULT_STORAGE_NAME: &str = "dashboard-store";

/// Persistence settings for a store.
///
/// # Example
///
/// ```
/// use slicestore_core::PersistConfig;
///
/// let config = PersistConfig::new(2).with_name("settings");
/// assert_eq!(config.version, 2);
/// assert_eq!(config.name, "settings");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistConfig {
    /// Storage entry the snapshot is written under
    pub name: String,
    /// Snapshot version; bump it to discard previously persisted state
    pub version: u32,
}

impl PersistConfig {
    /// Persist under the default storage name with the given version.
    #[must_use]
    pub fn new(version: u32) -> Self {
        Self {
            name: DEFAULT_STORAGE_NAME.to_string(),
            version,
        }
    }

    /// Set the storage entry name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the snapshot version.
    #[must_use]
    pub const fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// The persisted `{state, version}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedEnvelope {
    /// Projection of every slice's state, keyed by slice name
    pub state: Value,
    /// Version the snapshot was written under
    pub version: u32,
}

impl PersistedEnvelope {
    /// Wrap a state projection with its version.
    #[must_use]
    pub const fn new(state: Value, version: u32) -> Self {
        Self { state, version }
    }

    /// Serialize to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Serialization`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Deserialize from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Serialization`] if the bytes are not a valid envelope.
    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Extract the persisted state if it was written under `version`.
    ///
    /// Absent bytes, undecodable bytes and version mismatches all yield `None`:
    /// persisted state is best effort and falls back to defaults.
    #[must_use]
    pub fn usable_state(bytes: Option<&[u8]>, version: u32) -> Option<Value> {
        let envelope = Self::decode(bytes?).ok()?;
        (envelope.version == version).then_some(envelope.state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_wire_format() {
        let envelope = PersistedEnvelope::new(json!({ "fish": { "count": 3 } }), 1);
        let bytes = envelope.encode().unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(raw, json!({ "state": { "fish": { "count": 3 } }, "version": 1 }));
    }

    #[test]
    fn usable_state_requires_matching_version() {
        let bytes = PersistedEnvelope::new(json!({ "fish": {} }), 1)
            .encode()
            .unwrap();

        assert_eq!(
            PersistedEnvelope::usable_state(Some(&bytes), 1),
            Some(json!({ "fish": {} }))
        );
        assert_eq!(PersistedEnvelope::usable_state(Some(&bytes), 2), None);
    }

    #[test]
    fn usable_state_ignores_absent_and_malformed_bytes() {
        assert_eq!(PersistedEnvelope::usable_state(None, 0), None);
        assert_eq!(PersistedEnvelope::usable_state(Some(b"not json"), 0), None);
        assert_eq!(
            PersistedEnvelope::usable_state(Some(br#"{"state": {}}"#), 0),
            None
        );
    }

    #[test]
    fn default_config_uses_default_name() {
        let config = PersistConfig::default();
        assert_eq!(config.name, DEFAULT_STORAGE_NAME);
        assert_eq!(config.version, 0);
    }
}
