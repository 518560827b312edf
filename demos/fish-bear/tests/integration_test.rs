//! Integration tests for the fish and bear store
//!
//! These tests demonstrate the full end-to-end flow: composing slices,
//! mounting a provider, dispatching actions and persisting the result.

#![allow(clippy::unwrap_used)] // Tests can unwrap

use fish_bear::{BEAR, BearState, FISH, FishState, SNAPSHOT_VERSION, global_store_with};
use proptest::prelude::*;
use serde_json::json;
use slicestore_core::{DEFAULT_STORAGE_NAME, PersistConfig};
use slicestore_runtime::{InitStoreState, StoreConfig};
use slicestore_testing::{InMemoryStorage, StoreTest, init_test_tracing};
use std::sync::Arc;
use tokio_test::assert_ok;

fn init() -> InitStoreState {
    InitStoreState::new()
        .with(&FISH, json!({ "count": 10 }))
        .with(&BEAR, json!({ "count": 2 }))
}

fn config(storage: &InMemoryStorage) -> StoreConfig {
    StoreConfig::new().with_storage(Arc::new(storage.clone()))
}

#[tokio::test]
async fn test_fish_decrement_leaves_bear_alone() {
    init_test_tracing();
    let storage = InMemoryStorage::new();
    let context = global_store_with(config(&storage));
    let provider = context.provider(Some(init()));
    provider.store().persist().unwrap().wait_for_hydration().await.unwrap();

    provider.scope(|| {
        context.use_store().unwrap().actions(&FISH).unwrap().decrement(1);
    });

    let state = provider.store().get_state();
    assert_eq!(state.get(&FISH), Some(&FishState { count: 9 }));
    assert_eq!(state.get(&BEAR), Some(&BearState { count: 2 }));

    let envelope = storage
        .wait_for_envelope(DEFAULT_STORAGE_NAME, |envelope| envelope.state["fish"]["count"] == 9)
        .await;
    assert_eq!(envelope.version, SNAPSHOT_VERSION);
    assert_eq!(envelope.state, json!({ "fish": { "count": 9 }, "bear": { "count": 2 } }));
}

#[tokio::test]
async fn test_counts_survive_a_remount() {
    let storage = InMemoryStorage::new();
    let context = global_store_with(config(&storage));

    let first = context.provider(Some(init()));
    let persist = first.store().persist().unwrap();
    persist.wait_for_hydration().await.unwrap();
    first.store().actions(&BEAR).unwrap().increment(5);
    assert_ok!(persist.flush().await);
    drop(first);

    // Persisted values win over the mount-time overrides.
    let second = context.provider(Some(init()));
    second.store().persist().unwrap().wait_for_hydration().await.unwrap();
    assert_eq!(second.store().slice(&BEAR).unwrap().count, 7);
    assert_eq!(second.store().slice(&FISH).unwrap().count, 10);
}

#[tokio::test]
async fn test_bumped_version_starts_from_defaults() {
    let storage = InMemoryStorage::with_snapshot(
        DEFAULT_STORAGE_NAME,
        json!({ "fish": { "count": 99 }, "bear": { "count": 99 } }),
        SNAPSHOT_VERSION,
    );
    let context = global_store_with(
        config(&storage).with_persist(PersistConfig::new(SNAPSHOT_VERSION + 1)),
    );

    let provider = context.provider(None);
    provider.store().persist().unwrap().wait_for_hydration().await.unwrap();

    assert_eq!(provider.store().slice(&FISH).unwrap().count, 0);
    assert_eq!(provider.store().slice(&BEAR).unwrap().count, 0);
}

#[test]
fn test_store_test_scenario() {
    let context = global_store_with(StoreConfig::new());

    StoreTest::new(&context)
        .given_init(init())
        .when(|store| store.actions(&FISH).unwrap().decrement(1))
        .when(|store| store.actions(&BEAR).unwrap().increment(1))
        .then_slice(FISH, |fish| assert_eq!(fish.count, 9))
        .then_slice(BEAR, |bear| assert_eq!(bear.count, 3))
        .run();
}

proptest! {
    #[test]
    fn prop_increments_then_decrements_cancel(start in -1000i64..1000, qty in 0i64..100) {
        let context = global_store_with(StoreConfig::new());
        let store = context.create_store(Some(
            &InitStoreState::new().with(&FISH, json!({ "count": start })),
        ));
        let fish = store.actions(&FISH).unwrap();

        fish.increment(qty);
        fish.decrement(qty);

        prop_assert_eq!(store.slice(&FISH).unwrap().count, start);
        prop_assert_eq!(store.slice(&BEAR).unwrap().count, 0);
    }
}
