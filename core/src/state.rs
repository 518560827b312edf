//! The composed state of a store.
//!
//! [`ComposedState`] is an ordered association list from slice name to that
//! slice's state. It is immutable: an update produces a new `ComposedState`
//! that shares every untouched slice with its predecessor, so observers can
//! detect which slices changed with `Arc::ptr_eq`.

use crate::error::StateError;
use crate::merge::persisted_record;
use crate::slice::{SliceKey, SliceState, SliceValue};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One entry of the association list.
type Entry = (Arc<str>, Arc<dyn SliceValue>);

/// Every slice's current state, in registration order.
#[derive(Clone, Debug, Default)]
pub struct ComposedState {
    slices: Vec<Entry>,
}

/// A slice whose persisted record could not be applied during rehydration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceMergeFailure {
    /// Slice name
    pub key: String,
    /// Why the merged record was rejected
    pub error: StateError,
}

/// Outcome of [`ComposedState::rehydrated`].
#[derive(Debug, Clone)]
pub struct Rehydration {
    /// The reconciled state
    pub state: ComposedState,
    /// Slices that took values from the snapshot
    pub merged: Vec<String>,
    /// Slices whose persisted record was rejected; they keep their current value
    pub failures: Vec<SliceMergeFailure>,
}

impl ComposedState {
    /// Build a state from `(name, value)` pairs.
    ///
    /// A repeated name replaces the earlier value in place, keeping the
    /// position of its first occurrence.
    #[must_use]
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<Arc<str>>,
        I: IntoIterator<Item = (K, Arc<dyn SliceValue>)>,
    {
        let mut slices: Vec<Entry> = Vec::new();
        for (name, value) in entries {
            let name = name.into();
            match slices.iter_mut().find(|(existing, _)| *existing == name) {
                Some(entry) => entry.1 = value,
                None => slices.push((name, value)),
            }
        }
        Self { slices }
    }

    /// Number of slices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Whether the state holds no slices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Slice names in registration order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.slices.iter().map(|(name, _)| &**name)
    }

    /// Position of the slice named `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.slices.iter().position(|(existing, _)| &**existing == name)
    }

    /// Whether a slice named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// The type-erased value of the slice named `name`.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Arc<dyn SliceValue>> {
        self.slices
            .iter()
            .find(|(existing, _)| &**existing == name)
            .map(|(_, value)| value)
    }

    /// Borrow a slice's state.
    ///
    /// Returns `None` when the slice is missing or holds another type.
    #[must_use]
    pub fn get<S: SliceState, A>(&self, key: &SliceKey<S, A>) -> Option<&S> {
        self.raw(key.name())?.as_any().downcast_ref::<S>()
    }

    /// Shared handle to a slice's state.
    ///
    /// # Errors
    ///
    /// - [`StateError::UnknownSlice`] if no slice has this name
    /// - [`StateError::SliceTypeMismatch`] if the slice holds another type
    pub fn slice<S: SliceState, A>(&self, key: &SliceKey<S, A>) -> Result<Arc<S>, StateError> {
        let value = self
            .raw(key.name())
            .ok_or_else(|| StateError::UnknownSlice(key.name().to_string()))?;

        Arc::clone(value)
            .into_any_arc()
            .downcast::<S>()
            .map_err(|_| StateError::SliceTypeMismatch(key.name().to_string()))
    }

    /// A new state with the slice at `index` replaced; every other slice is shared.
    #[must_use]
    pub fn with_slice_at(&self, index: usize, value: Arc<dyn SliceValue>) -> Option<Self> {
        let mut slices = self.slices.clone();
        slices.get_mut(index)?.1 = value;
        Some(Self { slices })
    }

    /// A new state with the slice named `name` replaced.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::UnknownSlice`] if no slice has this name; keys are
    /// fixed once a state is composed.
    pub fn with_slice(&self, name: &str, value: Arc<dyn SliceValue>) -> Result<Self, StateError> {
        self.index_of(name)
            .and_then(|index| self.with_slice_at(index, value))
            .ok_or_else(|| StateError::UnknownSlice(name.to_string()))
    }

    /// Whether both states hold the very same value for `name`.
    #[must_use]
    pub fn shares_slice(&self, other: &Self, name: &str) -> bool {
        match (self.raw(name), other.raw(name)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Project every slice to JSON, keyed by name.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Serialization`] if any slice fails to serialize.
    pub fn to_json(&self) -> Result<Map<String, Value>, StateError> {
        self.slices
            .iter()
            .map(|(name, value)| Ok((name.to_string(), value.to_json()?)))
            .collect()
    }

    /// Reconcile a persisted snapshot with this state.
    ///
    /// Follows [`merge_persisted`](crate::merge_persisted) key by key. Slices
    /// without a persisted record are shared unchanged; a slice whose merged
    /// record does not deserialize keeps its current value and is reported in
    /// [`Rehydration::failures`].
    #[must_use]
    pub fn rehydrated(&self, persisted: Option<&Value>) -> Rehydration {
        let mut merged = Vec::new();
        let mut failures = Vec::new();

        let Some(persisted) = persisted.filter(|value| value.is_object()) else {
            return Rehydration {
                state: self.clone(),
                merged,
                failures,
            };
        };

        let slices = self
            .slices
            .iter()
            .map(|(name, value)| {
                let Some(record) = persisted_record(persisted, name) else {
                    return (Arc::clone(name), Arc::clone(value));
                };
                match value.merged_with(record) {
                    Ok(next) => {
                        merged.push(name.to_string());
                        (Arc::clone(name), next)
                    },
                    Err(error) => {
                        failures.push(SliceMergeFailure {
                            key: name.to_string(),
                            error,
                        });
                        (Arc::clone(name), Arc::clone(value))
                    },
                }
            })
            .collect();

        Rehydration {
            state: Self { slices },
            merged,
            failures,
        }
    }
}
