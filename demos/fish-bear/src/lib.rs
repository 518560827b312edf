//! # Fish and Bear Example
//!
//! Two independently authored slices composed into one persisted store.
//!
//! This example showcases:
//! - Slice templates returning default state and actions
//! - Composing slices under top-level keys
//! - Initial overrides at provider mount
//! - Versioned persistence of the composed state
//!
//! ## Example
//!
//! ```no_run
//! use fish_bear::{BEAR, FISH, global_store};
//! use serde_json::json;
//! use slicestore_runtime::InitStoreState;
//!
//! # async fn example() -> Result<(), slicestore_runtime::StoreError> {
//! let context = global_store();
//! let provider = context.provider(Some(
//!     InitStoreState::new()
//!         .with(&FISH, json!({ "count": 10 }))
//!         .with(&BEAR, json!({ "count": 2 })),
//! ));
//!
//! provider.scope(|| -> Result<(), slicestore_runtime::StoreError> {
//!     let store = context.use_store()?;
//!     store.actions(&FISH)?.decrement(1);
//!     Ok(())
//! })?;
//! assert_eq!(provider.store().slice(&FISH)?.count, 9);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use slicestore_core::{PersistConfig, SliceKey};
use slicestore_runtime::{
    GlobalStoreContext, SliceApi, SliceFactory, Slices, StoreConfig, create_global_store_context,
    create_store_slice,
};

/// Version of the persisted fish/bear snapshot
pub const SNAPSHOT_VERSION: u32 = 1;

/// Fish state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FishState {
    /// Number of fish
    pub count: i64,
}

/// Fish actions, scoped to the `fish` key
#[derive(Debug)]
pub struct FishActions {
    api: SliceApi<FishState>,
}

impl FishActions {
    /// Add `qty` fish, saturating at `i64::MAX`
    pub fn increment(&self, qty: i64) {
        self.api.update(|fish| fish.count = fish.count.saturating_add(qty));
    }

    /// Remove `qty` fish, saturating at `i64::MIN`
    pub fn decrement(&self, qty: i64) {
        self.api.update(|fish| fish.count = fish.count.saturating_sub(qty));
    }
}

/// Bear state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearState {
    /// Number of bears
    pub count: i64,
}

/// Bear actions, scoped to the `bear` key
#[derive(Debug)]
pub struct BearActions {
    api: SliceApi<BearState>,
}

impl BearActions {
    /// Add `qty` bears, saturating at `i64::MAX`
    pub fn increment(&self, qty: i64) {
        self.api.update(|bear| bear.count = bear.count.saturating_add(qty));
    }

    /// Remove `qty` bears, saturating at `i64::MIN`
    pub fn decrement(&self, qty: i64) {
        self.api.update(|bear| bear.count = bear.count.saturating_sub(qty));
    }
}

/// Key of the fish slice
pub const FISH: SliceKey<FishState, FishActions> = SliceKey::new("fish");

/// Key of the bear slice
pub const BEAR: SliceKey<BearState, BearActions> = SliceKey::new("bear");

/// The fish slice: starts with no fish
#[must_use]
pub fn fish_slice() -> SliceFactory<FishState, FishActions> {
    create_store_slice(|api| (FishState::default(), FishActions { api }))
}

/// The bear slice: starts with no bears
#[must_use]
pub fn bear_slice() -> SliceFactory<BearState, BearActions> {
    create_store_slice(|api| (BearState::default(), BearActions { api }))
}

/// Fish and bear, in that order
#[must_use]
pub fn slices() -> Slices {
    Slices::new().with(FISH, fish_slice()).with(BEAR, bear_slice())
}

/// The application's store context, persisted under the default name
#[must_use]
pub fn global_store() -> GlobalStoreContext {
    global_store_with(StoreConfig::new())
}

/// The application's store context with a custom configuration
///
/// Persistence at [`SNAPSHOT_VERSION`] is enabled unless `config` already
/// sets it.
#[must_use]
pub fn global_store_with(config: StoreConfig) -> GlobalStoreContext {
    let config = if config.persist.is_some() {
        config
    } else {
        config.with_persist(PersistConfig::new(SNAPSHOT_VERSION))
    };
    create_global_store_context(slices(), config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use slicestore_runtime::InitStoreState;

    #[test]
    fn test_actions_touch_only_their_slice() {
        let store = create_global_store_context(slices(), StoreConfig::new()).create_store(None);
        let before = store.get_state();

        store.actions(&BEAR).unwrap().increment(3);
        let after = store.get_state();

        assert_eq!(after.get(&BEAR).unwrap().count, 3);
        assert!(after.shares_slice(&before, "fish"));
    }

    #[test]
    fn test_overrides_at_mount() {
        let context = create_global_store_context(slices(), StoreConfig::new());
        let store = context.create_store(Some(
            &InitStoreState::new()
                .with(&FISH, json!({ "count": 10 }))
                .with(&BEAR, json!({ "count": 2 })),
        ));

        store.actions(&FISH).unwrap().decrement(1);

        assert_eq!(*store.slice(&FISH).unwrap(), FishState { count: 9 });
        assert_eq!(*store.slice(&BEAR).unwrap(), BearState { count: 2 });
    }

    #[test]
    fn test_counts_saturate_instead_of_overflowing() {
        let store = create_global_store_context(slices(), StoreConfig::new()).create_store(None);
        let fish = store.actions(&FISH).unwrap();
        let bear = store.actions(&BEAR).unwrap();

        fish.increment(i64::MAX);
        fish.increment(i64::MAX);
        bear.decrement(i64::MAX);
        bear.decrement(i64::MAX);

        assert_eq!(store.slice(&FISH).unwrap().count, i64::MAX);
        assert_eq!(store.slice(&BEAR).unwrap().count, i64::MIN);

        fish.decrement(1);
        assert_eq!(store.slice(&FISH).unwrap().count, i64::MAX - 1);
    }

    #[test]
    fn test_global_store_persists_at_snapshot_version() {
        let context = global_store();
        let persist = context.config().persist.as_ref().unwrap();
        assert_eq!(persist.version, SNAPSHOT_VERSION);
        assert_eq!(persist.name, slicestore_core::DEFAULT_STORAGE_NAME);
    }
}
