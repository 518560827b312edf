//! # SliceStore Runtime
//!
//! Runtime for composing one observable, optionally persisted store out of
//! independently authored slices.
//!
//! ## Core Components
//!
//! - **Slice factories**: [`create_store_slice`] turns a template into a factory
//!   bound to one top-level key
//! - **Store**: the single source of truth; commits are atomic and notify every
//!   subscriber with the new state
//! - **Persistence**: an actor that rehydrates the store from a versioned
//!   snapshot and writes every change back
//! - **Context binder**: [`create_global_store_context`] produces providers that
//!   own one store each, plus hooks that resolve the nearest provider
//!
//! ## Example
//!
//! ```ignore
//! use slicestore_runtime::{create_global_store_context, InitStoreState, Slices, StoreConfig};
//!
//! let context = create_global_store_context(
//!     Slices::new().with(FISH, fish_slice()).with(BEAR, bear_slice()),
//!     StoreConfig::new().with_persist(PersistConfig::new(1)),
//! );
//!
//! let provider = context.provider(Some(
//!     InitStoreState::new()
//!         .with(&FISH, json!({ "count": 10 }))
//!         .with(&BEAR, json!({ "count": 2 })),
//! ));
//!
//! let store = provider.store();
//! store.actions(&FISH)?.decrement(1);
//! assert_eq!(store.slice(&FISH)?.count, 9);
//! ```

/// Store configuration
pub mod config;

/// Providers and hooks binding stores to a scope
pub mod context;

/// Error types for the store runtime
pub mod error;

/// File-backed snapshot storage
pub mod file_storage;

/// Prometheus metrics for observability
pub mod metrics;

/// Versioned snapshot persistence
pub mod persistence;

/// Slice templates, factories and the slice-scoped API
pub mod slice;

/// The ordered slice mapping and initial overrides
pub mod slices;

/// The observable store
pub mod store;

pub use config::StoreConfig;
pub use context::{GlobalStoreContext, Provider, create_global_store_context};
pub use error::StoreError;
pub use file_storage::FileStorage;
pub use persistence::PersistHandle;
pub use slice::{SliceApi, SliceFactory, Updater, create_store_slice};
pub use slices::{InitStoreState, Slices};
pub use store::{Selection, SelectionRef, Store, StoreHandle, Subscription};

pub use slicestore_core::{
    ComposedState, DEFAULT_STORAGE_NAME, PersistConfig, SliceKey, SliceState, SliceValue,
    StateStorage, StorageError,
};
