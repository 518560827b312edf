//! # SliceStore Testing
//!
//! Testing utilities and helpers for SliceStore.
//!
//! This crate provides:
//! - In-memory and failing implementations of `StateStorage`
//! - A Given-When-Then builder for store tests
//! - Property-based testing strategies for snapshot values
//! - Tracing setup for tests
//!
//! ## Example
//!
//! ```ignore
//! use slicestore_testing::{init_test_tracing, InMemoryStorage};
//!
//! #[tokio::test]
//! async fn test_persisted_fish() {
//!     init_test_tracing();
//!     let storage = InMemoryStorage::new();
//!     let context = create_global_store_context(
//!         slices(),
//!         StoreConfig::new()
//!             .with_persist(PersistConfig::new(1))
//!             .with_storage(Arc::new(storage.clone())),
//!     );
//!
//!     let store = context.create_store(None);
//!     store.persist().unwrap().wait_for_hydration().await.unwrap();
//!     store.actions(&FISH).unwrap().increment(1);
//!
//!     let envelope = storage
//!         .wait_for_envelope("dashboard-store", |e| e.state["fish"]["count"] == 1)
//!         .await;
//!     assert_eq!(envelope.version, 1);
//! }
//! ```

/// In-memory storage backends
pub mod storage_mocks;

/// Fluent store test builder
pub mod store_test;

/// Property-based testing utilities
pub mod properties {
    use proptest::prelude::*;
    use serde_json::{Map, Value};

    /// Scalar JSON values: null, booleans, integers and short strings
    pub fn json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::String),
        ]
    }

    /// JSON values nested up to three levels deep
    pub fn json_value() -> impl Strategy<Value = Value> {
        json_scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|fields| Value::Object(fields.into_iter().collect())),
            ]
        })
    }

    /// Records with up to `max_fields` fields drawn from a small key space
    pub fn json_record(max_fields: usize) -> impl Strategy<Value = Map<String, Value>> {
        prop::collection::btree_map("[a-e]", json_value(), 0..=max_fields)
            .prop_map(|fields| fields.into_iter().collect())
    }
}

/// Install a test-friendly tracing subscriber
///
/// Honors `RUST_LOG`, writes through the test harness's capture and is safe
/// to call from every test.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use storage_mocks::{FailingStorage, InMemoryStorage};
pub use store_test::StoreTest;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use slicestore_core::{StateStorage, merge_record};

    #[tokio::test]
    async fn in_memory_storage_counts_writes() {
        let storage = InMemoryStorage::new();
        storage.set_item("a", b"1".to_vec()).await.unwrap();
        storage.set_item("a", b"2".to_vec()).await.unwrap();

        storage.wait_for_writes(2).await;
        assert_eq!(storage.raw("a"), Some(b"2".to_vec()));
        assert_eq!(storage.len(), 1);

        storage.remove_item("a").await.unwrap();
        assert!(storage.is_empty());
        assert_eq!(storage.writes(), 2);
    }

    #[tokio::test]
    async fn failing_storage_fails_selected_operations() {
        let storage = FailingStorage::new().failing_removes();
        storage.set_item("a", b"1".to_vec()).await.unwrap();

        tokio_test::assert_err!(storage.remove_item("a").await);
        assert!(storage.inner().contains_key("a"));

        let storage = FailingStorage::failing_all();
        assert!(storage.get_item("a").await.is_err());
    }

    #[test]
    fn seeded_snapshot_decodes() {
        let storage = InMemoryStorage::with_snapshot("store", serde_json::json!({ "fish": {} }), 3);
        let envelope = storage.envelope("store").unwrap();
        assert_eq!(envelope.version, 3);
        assert_eq!(storage.writes(), 0);
    }

    proptest! {
        #[test]
        fn generated_records_merge_onto_themselves(record in properties::json_record(4)) {
            prop_assert_eq!(merge_record(&record, &record), record);
        }
    }
}
