//! Typed slice keys and type-erased slice values.
//!
//! A store holds slices of different state types side by side. Each entry is an
//! `Arc<dyn SliceValue>`; typed access goes through a [`SliceKey`] that names the
//! entry and carries its state and action types.

use crate::error::StateError;
use crate::merge::merge_record;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Requirements for a type used as slice state.
///
/// Blanket-implemented for every type that can be cloned (clone-on-write
/// updates), debugged, and round-tripped through JSON (persistence and
/// partial overrides).
pub trait SliceState:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> SliceState for T where
    T: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Type-erased slice state held inside a [`ComposedState`](crate::ComposedState).
pub trait SliceValue: Any + Send + Sync + fmt::Debug {
    /// Borrow as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared handle into an `Arc<dyn Any>` for owned downcasting.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// Project this state to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Serialization`] if the state cannot be serialized.
    fn to_json(&self) -> Result<Value, StateError>;

    /// Produce a new value with `overlay`'s fields written over this state's fields.
    ///
    /// Only top-level fields are merged; nested records in `overlay` replace
    /// the corresponding field wholesale.
    ///
    /// # Errors
    ///
    /// - [`StateError::NotARecord`] if this state does not serialize to a JSON object
    /// - [`StateError::Serialization`] if the merged record does not deserialize back
    fn merged_with(&self, overlay: &Map<String, Value>) -> Result<Arc<dyn SliceValue>, StateError>;

    /// Name of the concrete state type, for diagnostics.
    fn type_name(&self) -> &'static str;
}

impl<S: SliceState> SliceValue for S {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn to_json(&self) -> Result<Value, StateError> {
        Ok(serde_json::to_value(self)?)
    }

    fn merged_with(&self, overlay: &Map<String, Value>) -> Result<Arc<dyn SliceValue>, StateError> {
        let Value::Object(base) = self.to_json()? else {
            return Err(StateError::NotARecord(self.type_name().to_string()));
        };
        let merged = merge_record(&base, overlay);
        let next: S = serde_json::from_value(Value::Object(merged))?;
        Ok(Arc::new(next))
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<S>()
    }
}

/// A typed name for one top-level slice of a store.
///
/// `S` is the slice's state type and `A` its actions type. Keys are usually
/// declared as constants next to the slice:
///
/// ```
/// use slicestore_core::SliceKey;
///
/// #[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
/// struct BearState {
///     count: i64,
/// }
///
/// struct BearActions;
///
/// const BEAR: SliceKey<BearState, BearActions> = SliceKey::new("bear");
/// assert_eq!(BEAR.name(), "bear");
/// ```
pub struct SliceKey<S, A> {
    name: &'static str,
    _types: PhantomData<fn() -> (S, A)>,
}

impl<S, A> SliceKey<S, A> {
    /// Create a key for the slice stored under `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _types: PhantomData,
        }
    }

    /// The top-level name this key addresses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<S, A> Clone for SliceKey<S, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S, A> Copy for SliceKey<S, A> {}

impl<S, A> fmt::Debug for SliceKey<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SliceKey").field(&self.name).finish()
    }
}

impl<S, A> fmt::Display for SliceKey<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
