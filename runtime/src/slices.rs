//! The ordered slice mapping and per-slice initial overrides.

use crate::error::StoreError;
use crate::slice::{InstallSlice, SliceFactory};
use crate::store::Store;
use serde::Serialize;
use serde_json::{Map, Value};
use slicestore_core::{ComposedState, SliceKey, SliceState, StateError};
use std::fmt;
use std::sync::Arc;

/// Ordered mapping from slice key to slice factory.
///
/// Slices are installed in the order they were added. Adding a key that is
/// already present replaces its factory but keeps its position.
///
/// ```ignore
/// let slices = Slices::new()
///     .with(FISH, fish_slice())
///     .with(BEAR, bear_slice());
/// ```
#[derive(Clone, Default)]
pub struct Slices {
    entries: Vec<(Arc<str>, Arc<dyn InstallSlice>)>,
}

impl Slices {
    /// An empty mapping
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `key`
    #[must_use]
    pub fn with<S, A>(mut self, key: SliceKey<S, A>, factory: SliceFactory<S, A>) -> Self
    where
        S: SliceState,
        A: Send + Sync + 'static,
    {
        let name: Arc<str> = Arc::from(key.name());
        let factory: Arc<dyn InstallSlice> = Arc::new(factory);

        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => {
                tracing::warn!(slice = %name, "Slice registered twice, replacing the earlier factory");
                entry.1 = factory;
            },
            None => self.entries.push((name, factory)),
        }
        self
    }

    /// Number of slices
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no slices are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slice names in installation order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| &**name)
    }

    /// Construct a store holding every slice.
    ///
    /// The store is allocated first so slice APIs can bind to it; each factory
    /// then runs in order with its override, and the results populate the
    /// store in one step.
    #[tracing::instrument(skip_all, fields(slices = self.entries.len()))]
    pub(crate) fn build(&self, init: Option<&InitStoreState>) -> Store {
        let store = Store::empty();
        let handle = store.handle();

        let mut states = Vec::with_capacity(self.entries.len());
        let mut actions = Vec::with_capacity(self.entries.len());
        for (name, factory) in &self.entries {
            let initial_override = init.and_then(|init| init.get(name));
            let (state, slice_actions) = factory.install(&handle, name, initial_override);
            states.push((Arc::clone(name), state));
            actions.push((Arc::clone(name), slice_actions));
        }

        if let Some(init) = init {
            for name in init.names().filter(|name| !self.keys().any(|key| key == *name)) {
                tracing::debug!(slice = name, "Ignoring initial override for unknown slice");
            }
        }

        store.populate(ComposedState::from_entries(states), actions);
        tracing::debug!("Store constructed");
        store
    }
}

impl fmt::Debug for Slices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.keys()).finish()
    }
}

/// Partial initial state per slice, merged over each slice's defaults.
///
/// ```
/// use serde_json::json;
/// use slicestore_runtime::InitStoreState;
///
/// let init = InitStoreState::new()
///     .with_name("fish", json!({ "count": 10 }))
///     .with_name("bear", json!({ "count": 2 }));
/// assert_eq!(init.get("fish"), Some(&json!({ "count": 10 })));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitStoreState {
    overrides: Map<String, Value>,
}

impl InitStoreState {
    /// No overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override fields of the slice under `key`
    #[must_use]
    pub fn with<S, A>(self, key: &SliceKey<S, A>, partial: Value) -> Self {
        self.with_name(key.name(), partial)
    }

    /// Override fields of the slice named `name`
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>, partial: Value) -> Self {
        self.overrides.insert(name.into(), partial);
        self
    }

    /// Override fields of the slice under `key` with any serializable partial
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::State`] if `partial` fails to serialize.
    pub fn try_with<S, A, P>(self, key: &SliceKey<S, A>, partial: &P) -> Result<Self, StoreError>
    where
        P: Serialize + ?Sized,
    {
        let partial = serde_json::to_value(partial).map_err(StateError::from)?;
        Ok(self.with(key, partial))
    }

    /// Overrides from a JSON record keyed by slice name
    ///
    /// A value that is not a record yields no overrides.
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(overrides) => Self { overrides },
            _ => Self::default(),
        }
    }

    /// The override for `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.overrides.get(name)
    }

    /// Names that carry an override
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.overrides.keys().map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::slice::{SliceApi, create_store_slice};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Count {
        count: i64,
    }

    const FISH: SliceKey<Count, SliceApi<Count>> = SliceKey::new("fish");
    const BEAR: SliceKey<Count, SliceApi<Count>> = SliceKey::new("bear");

    fn counter(start: i64) -> SliceFactory<Count, SliceApi<Count>> {
        create_store_slice(move |api| (Count { count: start }, api))
    }

    #[test]
    fn build_installs_slices_in_order() {
        let slices = Slices::new().with(FISH, counter(0)).with(BEAR, counter(5));
        let store = slices.build(None);

        let state = store.get_state();
        assert_eq!(state.keys().collect::<Vec<_>>(), vec!["fish", "bear"]);
        assert_eq!(state.get(&BEAR).unwrap().count, 5);
    }

    #[test]
    fn build_applies_overrides_per_slice() {
        let slices = Slices::new().with(FISH, counter(0)).with(BEAR, counter(0));
        let init = InitStoreState::new()
            .with(&FISH, json!({ "count": 10 }))
            .with_name("owl", json!({ "count": 1 }));

        let store = slices.build(Some(&init));

        assert_eq!(store.slice(&FISH).unwrap().count, 10);
        assert_eq!(store.slice(&BEAR).unwrap().count, 0);
        assert!(!store.get_state().contains("owl"));
    }

    #[test]
    fn duplicate_keys_replace_factory_in_place() {
        let slices = Slices::new()
            .with(FISH, counter(1))
            .with(BEAR, counter(2))
            .with(FISH, counter(3));

        assert_eq!(slices.keys().collect::<Vec<_>>(), vec!["fish", "bear"]);
        let store = slices.build(None);
        assert_eq!(store.slice(&FISH).unwrap().count, 3);
    }

    #[test]
    fn actions_are_wired_to_the_built_store() {
        let store = Slices::new().with(FISH, counter(0)).build(None);

        let fish = store.actions(&FISH).unwrap();
        fish.update(|fish| fish.count += 4);

        assert_eq!(store.slice(&FISH).unwrap().count, 4);
        assert_eq!(fish.get().unwrap().count, 4);
    }

    #[test]
    fn typed_partial_overrides() {
        #[derive(Serialize)]
        struct Partial {
            count: i64,
        }

        let init = InitStoreState::new()
            .try_with(&BEAR, &Partial { count: 2 })
            .unwrap();
        assert_eq!(init.get("bear"), Some(&json!({ "count": 2 })));
    }

    #[test]
    fn init_from_non_record_is_empty() {
        assert_eq!(InitStoreState::from_json(json!(3)), InitStoreState::new());
        let init = InitStoreState::from_json(json!({ "fish": { "count": 1 } }));
        assert_eq!(init.names().collect::<Vec<_>>(), vec!["fish"]);
    }
}
