//! # SliceStore Core
//!
//! Core types for composing one shared application state out of independently
//! authored slices.
//!
//! This crate holds the data model. It has no runtime and performs no I/O:
//!
//! - **Slice keys**: typed names tying a top-level key to its state and action types
//! - **Slice values**: type-erased slice state that can be projected to JSON and merged
//! - **Composed state**: the ordered association list of every slice's current state
//! - **Merge policy**: how persisted snapshots are reconciled with fresh defaults
//! - **Persisted envelope**: the versioned `{state, version}` wire format
//! - **Storage**: the key-value byte store abstraction persistence writes to
//!
//! The observable store, slice factories and persistence actor live in
//! `slicestore-runtime`.
//!
//! ## Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use slicestore_core::{ComposedState, SliceKey, SliceValue};
//! use std::sync::Arc;
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Fish {
//!     count: i64,
//! }
//!
//! const FISH: SliceKey<Fish, ()> = SliceKey::new("fish");
//!
//! let fish: Arc<dyn SliceValue> = Arc::new(Fish { count: 3 });
//! let state = ComposedState::from_entries([("fish", fish)]);
//! assert_eq!(state.slice(&FISH).map(|f| f.count).ok(), Some(3));
//! ```

pub use serde::{Deserialize, Serialize};

/// Error types shared across the workspace
pub mod error;

/// Shallow, one-level merging of JSON records
pub mod merge;

/// Versioned snapshot envelope and persistence configuration
pub mod persist;

/// Typed slice keys and type-erased slice values
pub mod slice;

/// The composed state of every slice in a store
pub mod state;

/// Key-value byte storage abstraction for persisted snapshots
pub mod storage;

pub use error::StateError;
pub use merge::{merge_persisted, merge_record};
pub use persist::{DEFAULT_STORAGE_NAME, PersistConfig, PersistedEnvelope};
pub use slice::{SliceKey, SliceState, SliceValue};
pub use state::{ComposedState, Rehydration, SliceMergeFailure};
pub use storage::{StateStorage, StorageError, StorageFuture};
