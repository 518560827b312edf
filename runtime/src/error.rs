use slicestore_core::{StateError, StorageError};
use thiserror::Error;

/// Errors that can occur during Store operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A store hook was called with no provider of its context in scope
    ///
    /// Fatal to the call: nothing is returned. Wrap the caller in
    /// `Provider::scope` or `Provider::render`.
    #[error("use_store must be used within a provider of context {context}")]
    MissingProvider {
        /// Identifier of the context whose provider was missing
        context: usize,
    },

    /// Reading or writing a slice failed
    #[error(transparent)]
    State(#[from] StateError),

    /// The storage backend failed during an awaited persistence operation
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The persistence task is no longer running
    #[error("Persistence task stopped")]
    PersistenceStopped,

    /// The store behind a weak handle has been dropped
    #[error("Store has been dropped")]
    StoreDropped,
}
