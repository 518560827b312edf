//! Slice factories.
//!
//! A slice template is a function that receives a [`SliceApi`] scoped to its
//! own key and returns the slice's default state together with its actions.
//! [`create_store_slice`] wraps a template into a [`SliceFactory`], which the
//! store builder binds to a key of the store under construction.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use slicestore_runtime::{create_store_slice, SliceApi, SliceFactory};
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! pub struct BearState {
//!     pub count: i64,
//! }
//!
//! pub struct BearActions {
//!     api: SliceApi<BearState>,
//! }
//!
//! impl BearActions {
//!     pub fn increment(&self, qty: i64) {
//!         self.api.update(|bear| bear.count += qty);
//!     }
//! }
//!
//! pub fn bear_slice() -> SliceFactory<BearState, BearActions> {
//!     create_store_slice(|api| (BearState { count: 0 }, BearActions { api }))
//! }
//! ```

use crate::error::StoreError;
use crate::store::StoreHandle;
use serde_json::Value;
use slicestore_core::{SliceState, SliceValue, StateError};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A replacement value or an in-place edit of a slice's state.
pub enum Updater<S> {
    /// Replace the whole slice state
    Replace(S),
    /// Edit a clone of the current state; the edited clone replaces it
    Draft(Box<dyn FnOnce(&mut S) + Send>),
}

impl<S> Updater<S> {
    /// Wrap an edit closure.
    pub fn draft<F>(recipe: F) -> Self
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        Self::Draft(Box::new(recipe))
    }
}

impl<S: fmt::Debug> fmt::Debug for Updater<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Replace(value) => f.debug_tuple("Updater::Replace").field(value).finish(),
            Self::Draft(_) => write!(f, "Updater::Draft(<fn>)"),
        }
    }
}

/// Mutation and read access scoped to one slice of a store.
///
/// Writes only ever touch this slice's key. [`store`](Self::store) is the
/// escape hatch for reading or writing other slices.
pub struct SliceApi<S> {
    store: StoreHandle,
    key: Arc<str>,
    _state: PhantomData<fn() -> S>,
}

impl<S> Clone for SliceApi<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            key: Arc::clone(&self.key),
            _state: PhantomData,
        }
    }
}

impl<S> fmt::Debug for SliceApi<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceApi").field("key", &self.key).finish()
    }
}

impl<S: SliceState> SliceApi<S> {
    pub(crate) const fn new(store: StoreHandle, key: Arc<str>) -> Self {
        Self {
            store,
            key,
            _state: PhantomData,
        }
    }

    /// The key this API is scoped to
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replace this slice's state
    pub fn set(&self, value: S) {
        self.apply(Updater::Replace(value));
    }

    /// Edit a clone of this slice's state in place
    pub fn update<F>(&self, recipe: F)
    where
        F: FnOnce(&mut S),
    {
        let result = self
            .store
            .store()
            .and_then(|store| store.update_named(&self.key, recipe));
        self.report(result);
    }

    /// Apply either form of update
    pub fn apply(&self, updater: Updater<S>) {
        match updater {
            Updater::Replace(value) => {
                let result = self.store.store().and_then(|store| {
                    store.commit(&self.key, |_| {
                        let value: Arc<dyn SliceValue> = Arc::new(value);
                        Ok(value)
                    })
                });
                self.report(result);
            },
            Updater::Draft(recipe) => self.update(recipe),
        }
    }

    /// Current state of this slice
    ///
    /// # Errors
    ///
    /// - [`StoreError::StoreDropped`] if the store is gone
    /// - [`StoreError::State`] if the slice is not installed yet (called while
    ///   the store is still being constructed)
    pub fn get(&self) -> Result<Arc<S>, StoreError> {
        let state = self.store.store()?.get_state();
        let value = state
            .raw(&self.key)
            .ok_or_else(|| StateError::UnknownSlice(self.key.to_string()))?;

        Ok(Arc::clone(value)
            .into_any_arc()
            .downcast::<S>()
            .map_err(|_| StateError::SliceTypeMismatch(self.key.to_string()))?)
    }

    /// Weak handle to the whole store, for cross-slice access
    #[must_use]
    pub const fn store(&self) -> &StoreHandle {
        &self.store
    }

    fn report(&self, result: Result<(), StoreError>) {
        if let Err(error) = result {
            tracing::warn!(slice = %self.key, %error, "Dropped slice update");
        }
    }
}

type Template<S, A> = dyn Fn(SliceApi<S>) -> (S, A) + Send + Sync;

/// A slice template ready to be bound to a key of a store.
pub struct SliceFactory<S, A> {
    template: Arc<Template<S, A>>,
}

impl<S, A> Clone for SliceFactory<S, A> {
    fn clone(&self) -> Self {
        Self {
            template: Arc::clone(&self.template),
        }
    }
}

impl<S, A> fmt::Debug for SliceFactory<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SliceFactory")
            .field("state", &std::any::type_name::<S>())
            .finish_non_exhaustive()
    }
}

/// Wrap a slice template into a factory.
pub fn create_store_slice<S, A, F>(template: F) -> SliceFactory<S, A>
where
    S: SliceState,
    A: Send + Sync + 'static,
    F: Fn(SliceApi<S>) -> (S, A) + Send + Sync + 'static,
{
    SliceFactory {
        template: Arc::new(template),
    }
}

impl<S: SliceState, A> SliceFactory<S, A> {
    /// Bind the template to `key` of `store`.
    ///
    /// Runs the template with an API scoped to `key`, then shallow-merges
    /// `initial_override` over the defaults it returned. An override that is
    /// not a record, or that produces a state that does not deserialize, is
    /// ignored with a warning.
    pub fn bind(&self, store: &StoreHandle, key: &str, initial_override: Option<&Value>) -> (S, A) {
        let api = SliceApi::new(store.clone(), Arc::from(key));
        let (defaults, actions) = (self.template)(api);

        let state = match initial_override {
            None | Some(Value::Null) => defaults,
            Some(overlay) => apply_override(defaults, key, overlay),
        };
        (state, actions)
    }
}

fn apply_override<S: SliceState>(defaults: S, key: &str, overlay: &Value) -> S {
    let Value::Object(fields) = overlay else {
        tracing::warn!(slice = key, "Ignoring initial override that is not a record");
        return defaults;
    };

    let merged = defaults.merged_with(fields).and_then(|merged| {
        merged
            .into_any_arc()
            .downcast::<S>()
            .map_err(|_| StateError::SliceTypeMismatch(key.to_string()))
    });

    match merged {
        Ok(merged) => Arc::unwrap_or_clone(merged),
        Err(error) => {
            tracing::warn!(slice = key, %error, "Ignoring initial override");
            defaults
        },
    }
}

/// Type-erased installation of a factory into a store under construction.
pub(crate) trait InstallSlice: Send + Sync {
    fn install(
        &self,
        store: &StoreHandle,
        key: &str,
        initial_override: Option<&Value>,
    ) -> (Arc<dyn SliceValue>, Arc<dyn Any + Send + Sync>);
}

impl<S, A> InstallSlice for SliceFactory<S, A>
where
    S: SliceState,
    A: Send + Sync + 'static,
{
    fn install(
        &self,
        store: &StoreHandle,
        key: &str,
        initial_override: Option<&Value>,
    ) -> (Arc<dyn SliceValue>, Arc<dyn Any + Send + Sync>) {
        let (state, actions) = self.bind(store, key, initial_override);
        (Arc::new(state), Arc::new(actions))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::Store;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Fish {
        count: i64,
        name: String,
    }

    fn fish_slice() -> SliceFactory<Fish, SliceApi<Fish>> {
        create_store_slice(|api| {
            (
                Fish {
                    count: 0,
                    name: "nemo".to_string(),
                },
                api,
            )
        })
    }

    #[test]
    fn bind_without_override_returns_defaults() {
        let store = Store::empty();
        let (state, api) = fish_slice().bind(&store.handle(), "fish", None);

        assert_eq!(state.count, 0);
        assert_eq!(api.key(), "fish");
    }

    #[test]
    fn override_fields_win() {
        let store = Store::empty();
        let overlay = json!({ "count": 10 });
        let (state, _) = fish_slice().bind(&store.handle(), "fish", Some(&overlay));

        assert_eq!(
            state,
            Fish {
                count: 10,
                name: "nemo".to_string()
            }
        );
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let store = Store::empty();
        let not_a_record = json!(10);
        let wrong_type = json!({ "count": "ten" });

        let (state, _) = fish_slice().bind(&store.handle(), "fish", Some(&not_a_record));
        assert_eq!(state.count, 0);

        let (state, _) = fish_slice().bind(&store.handle(), "fish", Some(&wrong_type));
        assert_eq!(state.count, 0);
    }

    #[test]
    fn writes_before_population_are_dropped() {
        let store = Store::empty();
        let (_, api) = fish_slice().bind(&store.handle(), "fish", None);

        api.update(|fish| fish.count = 5);
        assert!(api.get().is_err());
    }

    #[test]
    fn writes_after_store_drop_are_dropped() {
        let store = Store::empty();
        let (_, api) = fish_slice().bind(&store.handle(), "fish", None);
        drop(store);

        api.set(Fish {
            count: 1,
            name: "dory".to_string(),
        });
        assert_eq!(api.get().unwrap_err(), StoreError::StoreDropped);
    }

    #[test]
    fn updater_debug_hides_closures() {
        let replace: Updater<i64> = Updater::Replace(3);
        let draft: Updater<i64> = Updater::draft(|value| *value += 1);

        assert_eq!(format!("{replace:?}"), "Updater::Replace(3)");
        assert_eq!(format!("{draft:?}"), "Updater::Draft(<fn>)");
    }
}
