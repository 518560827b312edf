//! Key-value byte storage for persisted snapshots.
//!
//! The persistence layer writes one entry per store, named by
//! [`PersistConfig::name`](crate::PersistConfig). Backends only move bytes;
//! encoding and version checks happen above them.
//!
//! # Implementations
//!
//! - `FileStorage` (in `slicestore-runtime`): one file per entry under a directory
//! - `InMemoryStorage` (in `slicestore-testing`): `HashMap`-backed, for tests
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures instead of using `async fn` so backends can be
//! shared as `Arc<dyn StateStorage>` by the persistence actor.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by [`StateStorage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Errors from a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading or writing the underlying medium failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The backend rejected the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for StorageError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// A key-value byte store holding persisted snapshots.
///
/// Implementations must be `Send + Sync`; the persistence actor calls them
/// from a tokio task.
pub trait StateStorage: Send + Sync {
    /// Read the entry stored under `name`.
    ///
    /// Returns `Ok(None)` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    fn get_item(&self, name: &str) -> StorageFuture<'_, Option<Vec<u8>>>;

    /// Write `value` under `name`, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn set_item(&self, name: &str, value: Vec<u8>) -> StorageFuture<'_, ()>;

    /// Remove the entry under `name`. Removing a missing entry succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be written.
    fn remove_item(&self, name: &str) -> StorageFuture<'_, ()>;
}
