//! Store configuration.

use crate::file_storage::FileStorage;
use slicestore_core::{PersistConfig, StateStorage};
use std::fmt;
use std::sync::Arc;

/// Configuration for stores built by a `GlobalStoreContext`
///
/// Persistence is off by default. Enabling it without a storage backend
/// falls back to [`FileStorage::from_env`].
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::default()
///     .with_persist(PersistConfig::new(1))
///     .with_storage(Arc::new(InMemoryStorage::new()));
///
/// let context = create_global_store_context(slices, config);
/// ```
#[derive(Clone, Default)]
pub struct StoreConfig {
    /// Persistence settings; `None` keeps the store in memory only
    pub persist: Option<PersistConfig>,
    /// Backend persisted snapshots are written to
    pub storage: Option<Arc<dyn StateStorage>>,
}

impl StoreConfig {
    /// In-memory configuration with no persistence
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable persistence
    #[must_use]
    pub fn with_persist(mut self, persist: PersistConfig) -> Self {
        self.persist = Some(persist);
        self
    }

    /// Set the storage backend used when persistence is enabled
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StateStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// The configured backend, or file storage from the environment
    pub(crate) fn storage_or_default(&self) -> Arc<dyn StateStorage> {
        self.storage
            .clone()
            .unwrap_or_else(|| Arc::new(FileStorage::from_env()))
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("persist", &self.persist)
            .field("storage", &self.storage.as_ref().map(|_| "<dyn StateStorage>"))
            .finish()
    }
}
