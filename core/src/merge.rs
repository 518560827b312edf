//! Persistence merge policy.
//!
//! On rehydration a persisted snapshot is reconciled with freshly built
//! default state, one top-level key at a time:
//!
//! - no snapshot, or a snapshot that is not a record: defaults win unchanged
//! - key in both, persisted value is a record: shallow merge, persisted fields win
//! - key only in the defaults, or persisted value is not a record: default kept
//! - key only in the snapshot: dropped
//!
//! The merge is one level deep per slice. A nested record inside a slice is
//! replaced by the persisted value, not merged recursively.

use serde_json::{Map, Value};

/// Write `overlay`'s fields over `base`, returning the combined record.
///
/// Fields only in `base` are kept, fields in `overlay` replace or extend them.
/// Values are not merged recursively.
#[must_use]
pub fn merge_record(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (field, value) in overlay {
        merged.insert(field.clone(), value.clone());
    }
    merged
}

/// Reconcile a persisted snapshot with the current state, on JSON.
///
/// `current` maps slice names to their projected state. The result has
/// exactly the keys of `current`, in the same order.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use slicestore_core::merge_persisted;
///
/// let current = json!({ "fish": { "count": 10 }, "bear": { "count": 0 } });
/// let persisted = json!({ "fish": { "count": 3 }, "wolf": { "count": 1 } });
///
/// let merged = merge_persisted(Some(&persisted), current.as_object().unwrap_or(&Default::default()));
/// assert_eq!(
///     serde_json::Value::Object(merged),
///     json!({ "fish": { "count": 3 }, "bear": { "count": 0 } })
/// );
/// ```
#[must_use]
pub fn merge_persisted(persisted: Option<&Value>, current: &Map<String, Value>) -> Map<String, Value> {
    let Some(Value::Object(persisted)) = persisted else {
        return current.clone();
    };

    current
        .iter()
        .map(|(key, default)| {
            let value = match (default, persisted.get(key)) {
                (Value::Object(default), Some(Value::Object(stored))) => {
                    Value::Object(merge_record(default, stored))
                },
                _ => default.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}

/// The persisted record for `key`, if the snapshot holds one.
///
/// Used by typed rehydration to decide which slices take part in the merge.
#[must_use]
pub fn persisted_record<'a>(persisted: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    persisted.as_object()?.get(key)?.as_object()
}
