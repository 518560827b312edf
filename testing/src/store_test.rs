//! Ergonomic testing utilities for stores
//!
//! This module provides a fluent API for testing slice actions with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // StoreTest is the natural name

use slicestore_core::{ComposedState, SliceKey, SliceState};
use slicestore_runtime::{GlobalStoreContext, InitStoreState, Store};

/// Type alias for store interactions and assertions
type StoreStep = Box<dyn FnOnce(&Store)>;

/// Type alias for whole-state assertion functions
type StateAssertion = Box<dyn FnOnce(&ComposedState)>;

/// Fluent API for testing stores with Given-When-Then syntax
///
/// # Example
///
/// ```ignore
/// use slicestore_testing::StoreTest;
///
/// StoreTest::new(&context)
///     .given_init(InitStoreState::new().with(&FISH, json!({ "count": 10 })))
///     .when(|store| store.actions(&FISH).unwrap().decrement(1))
///     .then_slice(FISH, |fish| assert_eq!(fish.count, 9))
///     .then_state(|state| assert_eq!(state.len(), 2))
///     .run();
/// ```
pub struct StoreTest<'a> {
    context: &'a GlobalStoreContext,
    init: Option<InitStoreState>,
    actions: Vec<StoreStep>,
    slice_assertions: Vec<StoreStep>,
    state_assertions: Vec<StateAssertion>,
}

impl<'a> StoreTest<'a> {
    /// Create a new store test against the given context
    #[must_use]
    pub const fn new(context: &'a GlobalStoreContext) -> Self {
        Self {
            context,
            init: None,
            actions: Vec::new(),
            slice_assertions: Vec::new(),
            state_assertions: Vec::new(),
        }
    }

    /// Set the initial overrides (Given)
    #[must_use]
    pub fn given_init(mut self, init: InitStoreState) -> Self {
        self.init = Some(init);
        self
    }

    /// Add an interaction with the store (When)
    ///
    /// Interactions run in the order they were added.
    #[must_use]
    pub fn when<F>(mut self, action: F) -> Self
    where
        F: FnOnce(&Store) + 'static,
    {
        self.actions.push(Box::new(action));
        self
    }

    /// Add an assertion about one slice's resulting state (Then)
    ///
    /// # Panics
    ///
    /// The assertion panics when run if `key` is not part of the store.
    #[must_use]
    pub fn then_slice<S, A, F>(mut self, key: SliceKey<S, A>, assertion: F) -> Self
    where
        S: SliceState,
        A: 'static,
        F: FnOnce(&S) + 'static,
    {
        self.slice_assertions.push(Box::new(move |store| {
            #[allow(clippy::panic)] // Test assertion
            let state = store
                .slice(&key)
                .unwrap_or_else(|error| panic!("slice `{key}` unavailable: {error}"));
            assertion(&state);
        }));
        self
    }

    /// Add an assertion about the resulting composed state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&ComposedState) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// Returns the store so follow-up checks can run against it.
    ///
    /// # Panics
    ///
    /// Panics if any assertion fails.
    pub fn run(self) -> Store {
        let store = self.context.create_store(self.init.as_ref());

        for action in self.actions {
            action(&store);
        }

        for assertion in self.slice_assertions {
            assertion(&store);
        }

        let state = store.get_state();
        for assertion in self.state_assertions {
            assertion(&state);
        }

        store
    }
}

/// Helper assertions for composed state
pub mod assertions {
    use slicestore_core::ComposedState;

    /// Assert the slice names of `state`, in order
    ///
    /// # Panics
    ///
    /// Panics if the names differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_slice_order(state: &ComposedState, expected: &[&str]) {
        let actual: Vec<&str> = state.keys().collect();
        assert_eq!(
            actual, expected,
            "Expected slices {expected:?}, but found {actual:?}"
        );
    }

    /// Assert that `before` and `after` share the slice named `name`
    ///
    /// # Panics
    ///
    /// Panics if the slice was replaced between the two states.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_slice_untouched(before: &ComposedState, after: &ComposedState, name: &str) {
        assert!(
            after.shares_slice(before, name),
            "Expected slice `{name}` to be untouched, but it was replaced"
        );
    }
}
