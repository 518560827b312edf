//! In-memory storage backends for persistence tests
//!
//! - [`InMemoryStorage`]: `HashMap`-backed storage that counts writes
//! - [`FailingStorage`]: storage whose operations fail on demand

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use serde_json::Value;
use slicestore_core::{PersistedEnvelope, StateStorage, StorageError, StorageFuture};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;

/// In-memory storage for fast, deterministic persistence tests.
///
/// Clones share the same entries, so a test can hand one clone to a store
/// and inspect the other.
///
/// # Example
///
/// ```
/// use slicestore_core::StateStorage;
/// use slicestore_testing::InMemoryStorage;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = InMemoryStorage::new();
/// storage.set_item("dashboard-store", b"{}".to_vec()).await?;
///
/// assert_eq!(storage.get_item("dashboard-store").await?, Some(b"{}".to_vec()));
/// assert_eq!(storage.writes(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    writes: Arc<watch::Sender<usize>>,
}

impl InMemoryStorage {
    /// Create a new empty storage
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            writes: Arc::new(watch::Sender::new(0)),
        }
    }

    /// Storage pre-seeded with an envelope holding `state` at `version`
    #[must_use]
    pub fn with_snapshot(name: &str, state: Value, version: u32) -> Self {
        let storage = Self::new();
        storage.insert_envelope(name, state, version);
        storage
    }

    /// Store raw bytes under `name` without counting a write
    pub fn insert_raw(&self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.data
            .write()
            .unwrap()
            .insert(name.to_string(), bytes.into());
    }

    /// Store an encoded envelope under `name` without counting a write
    pub fn insert_envelope(&self, name: &str, state: Value, version: u32) {
        let bytes = PersistedEnvelope::new(state, version).encode().unwrap();
        self.insert_raw(name, bytes);
    }

    /// Raw bytes stored under `name`
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<Vec<u8>> {
        self.data.read().unwrap().get(name).cloned()
    }

    /// The decoded envelope stored under `name`
    #[must_use]
    pub fn envelope(&self, name: &str) -> Option<PersistedEnvelope> {
        self.raw(name)
            .and_then(|bytes| PersistedEnvelope::decode(&bytes).ok())
    }

    /// Whether an entry exists under `name`
    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.data.read().unwrap().contains_key(name)
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether the storage holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    /// Number of completed `set_item` calls
    #[must_use]
    pub fn writes(&self) -> usize {
        *self.writes.borrow()
    }

    /// Wait until at least `count` writes have completed
    pub async fn wait_for_writes(&self, count: usize) {
        let mut writes = self.writes.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = writes.wait_for(|done| *done >= count).await;
    }

    /// Wait until the envelope under `name` satisfies `predicate`
    pub async fn wait_for_envelope<F>(&self, name: &str, predicate: F) -> PersistedEnvelope
    where
        F: Fn(&PersistedEnvelope) -> bool,
    {
        let mut writes = self.writes.subscribe();
        loop {
            if let Some(envelope) = self.envelope(name).filter(|envelope| predicate(envelope)) {
                return envelope;
            }
            writes.changed().await.unwrap();
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStorage for InMemoryStorage {
    fn get_item(&self, name: &str) -> StorageFuture<'_, Option<Vec<u8>>> {
        let bytes = self.raw(name);
        Box::pin(async move { Ok(bytes) })
    }

    fn set_item(&self, name: &str, value: Vec<u8>) -> StorageFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            self.data.write().unwrap().insert(name, value);
            self.writes.send_modify(|writes| *writes += 1);
            Ok(())
        })
    }

    fn remove_item(&self, name: &str) -> StorageFuture<'_, ()> {
        let name = name.to_string();
        Box::pin(async move {
            self.data.write().unwrap().remove(&name);
            Ok(())
        })
    }
}

/// Storage whose operations fail on demand.
///
/// Operations that are not set to fail are served by an inner
/// [`InMemoryStorage`].
///
/// # Example
///
/// ```
/// use slicestore_core::StateStorage;
/// use slicestore_testing::FailingStorage;
///
/// # async fn example() {
/// let storage = FailingStorage::new().failing_writes();
/// assert!(storage.set_item("dashboard-store", Vec::new()).await.is_err());
/// assert!(storage.get_item("dashboard-store").await.is_ok());
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct FailingStorage {
    inner: InMemoryStorage,
    reads: bool,
    writes: bool,
    removes: bool,
}

impl FailingStorage {
    /// Storage that does not fail yet
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage failing every operation
    #[must_use]
    pub fn failing_all() -> Self {
        Self::new().failing_reads().failing_writes().failing_removes()
    }

    /// Fail `get_item`
    #[must_use]
    pub const fn failing_reads(mut self) -> Self {
        self.reads = true;
        self
    }

    /// Fail `set_item`
    #[must_use]
    pub const fn failing_writes(mut self) -> Self {
        self.writes = true;
        self
    }

    /// Fail `remove_item`
    #[must_use]
    pub const fn failing_removes(mut self) -> Self {
        self.removes = true;
        self
    }

    /// The storage serving operations that do not fail
    #[must_use]
    pub const fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }

    fn injected(operation: &str) -> StorageError {
        StorageError::Backend(format!("injected {operation} failure"))
    }
}

impl StateStorage for FailingStorage {
    fn get_item(&self, name: &str) -> StorageFuture<'_, Option<Vec<u8>>> {
        if self.reads {
            return Box::pin(async { Err(Self::injected("read")) });
        }
        self.inner.get_item(name)
    }

    fn set_item(&self, name: &str, value: Vec<u8>) -> StorageFuture<'_, ()> {
        if self.writes {
            return Box::pin(async { Err(Self::injected("write")) });
        }
        self.inner.set_item(name, value)
    }

    fn remove_item(&self, name: &str) -> StorageFuture<'_, ()> {
        if self.removes {
            return Box::pin(async { Err(Self::injected("remove")) });
        }
        self.inner.remove_item(name)
    }
}
