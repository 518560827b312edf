//! Context binder.
//!
//! [`create_global_store_context`] turns a slice mapping into a
//! [`GlobalStoreContext`]. The context hands out [`Provider`]s, each owning
//! exactly one store, and hooks that resolve the store of the nearest
//! enclosing provider.
//!
//! Provider scope is tracked per thread: code running inside
//! [`Provider::scope`] (or [`Provider::render`]) on the same thread can call
//! [`GlobalStoreContext::use_store`]. Nested providers of the same context
//! shadow outer ones.
//!
//! # Example
//!
//! ```ignore
//! let context = create_global_store_context(
//!     Slices::new().with(FISH, fish_slice()).with(BEAR, bear_slice()),
//!     StoreConfig::new(),
//! );
//!
//! let provider = context.provider(Some(InitStoreState::new().with(&FISH, json!({ "count": 10 }))));
//! provider.scope(|| {
//!     let store = context.use_store()?;
//!     store.actions(&FISH)?.decrement(1);
//!     Ok::<_, StoreError>(())
//! })?;
//! ```

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::persistence;
use crate::slices::{InitStoreState, Slices};
use crate::store::{Selection, Store, Subscription};
use slicestore_core::ComposedState;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

static NEXT_CONTEXT_ID: AtomicUsize = AtomicUsize::new(1);

thread_local! {
    static PROVIDERS: RefCell<Vec<(usize, Store)>> = const { RefCell::new(Vec::new()) };
}

/// Build a context for stores composed of `slices`.
#[must_use]
pub fn create_global_store_context(slices: Slices, config: StoreConfig) -> GlobalStoreContext {
    GlobalStoreContext {
        id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
        slices: Arc::new(slices),
        config,
    }
}

/// Factory for stores of one slice composition, plus its provider and hooks.
#[derive(Clone)]
pub struct GlobalStoreContext {
    id: usize,
    slices: Arc<Slices>,
    config: StoreConfig,
}

impl GlobalStoreContext {
    /// Identifier distinguishing this context's providers from others
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// The configuration stores are built with
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Construct a new store
    ///
    /// The returned store is fully populated with defaults and overrides.
    /// With persistence configured, rehydration starts in the background.
    #[tracing::instrument(skip_all, fields(context = self.id))]
    pub fn create_store(&self, init: Option<&InitStoreState>) -> Store {
        let store = self.slices.build(init);
        if let Some(persist) = &self.config.persist {
            persistence::attach(&store, persist.clone(), self.config.storage_or_default());
        }
        store
    }

    /// Mount a provider owning a freshly constructed store
    #[must_use]
    pub fn provider(&self, init: Option<InitStoreState>) -> Provider {
        Provider {
            context: self.id,
            store: self.create_store(init.as_ref()),
        }
    }

    /// The store of the nearest enclosing provider
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingProvider`] outside any provider scope of
    /// this context.
    pub fn use_store(&self) -> Result<Store, StoreError> {
        PROVIDERS
            .with(|providers| {
                providers
                    .borrow()
                    .iter()
                    .rev()
                    .find(|(context, _)| *context == self.id)
                    .map(|(_, store)| store.clone())
            })
            .ok_or(StoreError::MissingProvider { context: self.id })
    }

    /// A live projection of the nearest enclosing provider's state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::MissingProvider`] outside any provider scope of
    /// this context.
    pub fn use_store_with<U, F>(&self, selector: F) -> Result<Selection<U>, StoreError>
    where
        U: PartialEq + Send + Sync + 'static,
        F: Fn(&ComposedState) -> U + Send + Sync + 'static,
    {
        Ok(self.use_store()?.select(selector))
    }
}

impl fmt::Debug for GlobalStoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalStoreContext")
            .field("id", &self.id)
            .field("slices", &self.slices)
            .field("config", &self.config)
            .finish()
    }
}

/// A mounted provider: owns one store for its whole lifetime.
///
/// Dropping the provider drops its store unless other handles are held.
pub struct Provider {
    context: usize,
    store: Store,
}

impl Provider {
    /// The provider's store
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Run `children` with this provider's store in scope
    pub fn scope<R>(&self, children: impl FnOnce() -> R) -> R {
        let _entered = ScopeGuard::enter(self.context, self.store.clone());
        children()
    }

    /// Run `children` in scope with the current state
    pub fn render<R>(&self, children: impl FnOnce(&ComposedState) -> R) -> R {
        self.scope(|| children(&self.store.get_state()))
    }

    /// Call `children` with the current state now and after every change
    ///
    /// A state older than the last one rendered is skipped.
    pub fn render_on_change<F>(&self, children: F) -> Subscription
    where
        F: Fn(&ComposedState) + Send + Sync + 'static,
    {
        let rendered = AtomicU64::new(0);
        self.store.observe(move |revision, state| {
            if rendered.fetch_max(revision, Ordering::SeqCst) <= revision {
                children(state);
            }
        })
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("context", &self.context)
            .field("store", &self.store)
            .finish()
    }
}

/// Pushes a provider on the thread's scope stack; pops it on drop.
struct ScopeGuard;

impl ScopeGuard {
    fn enter(context: usize, store: Store) -> Self {
        PROVIDERS.with(|providers| providers.borrow_mut().push((context, store)));
        Self
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        PROVIDERS.with(|providers| {
            providers.borrow_mut().pop();
        });
    }
}
