//! The observable store.
//!
//! A [`Store`] holds the current [`ComposedState`] as an immutable snapshot
//! behind a short-lived lock. Every commit swaps in a new snapshot that
//! shares all untouched slices, then notifies subscribers with no state lock
//! held, so recipes and listeners may read from or write to the store again.
//!
//! Writers are serialized by a reentrant writer lock that also covers
//! notification. Commits from different threads therefore reach subscribers
//! in commit order, while a recipe or listener committing on the same thread
//! re-enters without blocking. Each commit carries a revision number so
//! projections can drop deliveries older than what they already hold.
//!
//! Construction is two-phase: the shared cell is allocated empty, slice
//! factories bind their `SliceApi`s to a weak handle on it, and only then is
//! the cell populated with the computed initial state and actions table.

use crate::error::StoreError;
use crate::metrics::StoreMetrics;
use crate::persistence::PersistHandle;
use serde_json::Value;
use slicestore_core::{ComposedState, Rehydration, SliceKey, SliceState, SliceValue, StateError};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::ReentrantMutex;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock, Weak};
use tokio::sync::watch;

/// Callback invoked with the revision and new state after every commit.
pub(crate) type Listener = Arc<dyn Fn(u64, &Arc<ComposedState>) + Send + Sync>;

/// Actions table entry: slice name and its type-erased actions value.
pub(crate) type ActionsEntry = (Arc<str>, Arc<dyn Any + Send + Sync>);

pub(crate) struct StoreInner {
    state: RwLock<Arc<ComposedState>>,
    revision: AtomicU64,
    writer: ReentrantMutex<()>,
    actions: OnceLock<Vec<ActionsEntry>>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    persist: OnceLock<PersistHandle>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The shared application store
///
/// Cloning a `Store` yields another handle to the same state.
///
/// # Example
///
/// ```ignore
/// let store = context.create_store(None);
///
/// let fish = store.actions(&FISH)?;
/// fish.increment(2);
///
/// let count = store.slice(&FISH)?.count;
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// A store with no slices, awaiting [`populate`](Self::populate).
    pub(crate) fn empty() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(Arc::new(ComposedState::default())),
                revision: AtomicU64::new(0),
                writer: ReentrantMutex::new(()),
                actions: OnceLock::new(),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                persist: OnceLock::new(),
            }),
        }
    }

    /// Install the initial state and actions table. Runs once per store.
    pub(crate) fn populate(&self, state: ComposedState, actions: Vec<ActionsEntry>) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(state);
        if self.inner.actions.set(actions).is_err() {
            tracing::warn!("Store actions were already populated, keeping the first table");
        }
    }

    pub(crate) fn attach_persist(&self, handle: PersistHandle) {
        if self.inner.persist.set(handle).is_err() {
            tracing::warn!("Store already has a persistence layer attached");
        }
    }

    /// A weak handle that does not keep the store alive
    #[must_use]
    pub fn handle(&self) -> StoreHandle {
        StoreHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Whether both handles refer to the same store
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The current state snapshot
    #[must_use]
    pub fn get_state(&self) -> Arc<ComposedState> {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*state)
    }

    /// Current state of one slice
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::State`] if the slice is unknown or has another type.
    pub fn slice<S: SliceState, A>(&self, key: &SliceKey<S, A>) -> Result<Arc<S>, StoreError> {
        Ok(self.get_state().slice(key)?)
    }

    /// Actions of one slice
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::State`] if the slice is unknown or its actions
    /// have another type.
    pub fn actions<S, A>(&self, key: &SliceKey<S, A>) -> Result<Arc<A>, StoreError>
    where
        A: Send + Sync + 'static,
    {
        let unknown = || StateError::UnknownSlice(key.name().to_string());
        let actions = self
            .inner
            .actions
            .get()
            .and_then(|table| table.iter().find(|(name, _)| &**name == key.name()))
            .map(|(_, actions)| Arc::clone(actions))
            .ok_or_else(unknown)?;

        actions
            .downcast::<A>()
            .map_err(|_| StateError::SliceTypeMismatch(key.name().to_string()).into())
    }

    /// Replace one slice's state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::State`] if the slice is unknown.
    pub fn set_slice<S: SliceState, A>(&self, key: &SliceKey<S, A>, value: S) -> Result<(), StoreError> {
        self.commit(key.name(), |_| {
            let value: Arc<dyn SliceValue> = Arc::new(value);
            Ok(value)
        })
    }

    /// Edit a clone of one slice's state; the edited clone becomes the new state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::State`] if the slice is unknown or has another type.
    pub fn update_slice<S, A, F>(&self, key: &SliceKey<S, A>, recipe: F) -> Result<(), StoreError>
    where
        S: SliceState,
        F: FnOnce(&mut S),
    {
        self.update_named(key.name(), recipe)
    }

    pub(crate) fn update_named<S, F>(&self, name: &str, recipe: F) -> Result<(), StoreError>
    where
        S: SliceState,
        F: FnOnce(&mut S),
    {
        self.commit(name, |current| {
            let mut draft = current
                .as_any()
                .downcast_ref::<S>()
                .cloned()
                .ok_or_else(|| StateError::SliceTypeMismatch(name.to_string()))?;
            recipe(&mut draft);
            let next: Arc<dyn SliceValue> = Arc::new(draft);
            Ok(next)
        })
    }

    /// Swap in a new value for the slice `name` and notify subscribers.
    ///
    /// `next` runs with no state lock held. A nested commit it makes on the
    /// same thread to another slice survives; one to the same slice is
    /// overwritten by the outer result.
    pub(crate) fn commit<F>(&self, name: &str, next: F) -> Result<(), StoreError>
    where
        F: FnOnce(&Arc<dyn SliceValue>) -> Result<Arc<dyn SliceValue>, StateError>,
    {
        let unknown = || StateError::UnknownSlice(name.to_string());
        let _writer = self.inner.writer.lock();

        let snapshot = self.get_state();
        let index = snapshot.index_of(name).ok_or_else(unknown)?;
        let current = snapshot.raw(name).ok_or_else(unknown)?;
        let value = next(current)?;

        let (revision, committed) = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let updated = state.with_slice_at(index, value).ok_or_else(unknown)?;
            *state = Arc::new(updated);
            let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
            (revision, Arc::clone(&*state))
        };

        tracing::trace!(slice = name, revision, "Committed slice update");
        StoreMetrics::record_commit(name);
        self.notify(revision, &committed);
        Ok(())
    }

    /// Merge a persisted snapshot into the current state atomically.
    ///
    /// Subscribers are notified only if some slice took persisted values.
    pub(crate) fn rehydrate_from(&self, persisted: Option<&Value>) -> Rehydration {
        let _writer = self.inner.writer.lock();
        let (rehydration, committed) = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let rehydration = state.rehydrated(persisted);
            if rehydration.merged.is_empty() {
                (rehydration, None)
            } else {
                *state = Arc::new(rehydration.state.clone());
                let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
                (rehydration, Some((revision, Arc::clone(&*state))))
            }
        };

        if let Some((revision, committed)) = committed {
            self.notify(revision, &committed);
        }
        rehydration
    }

    /// Call every listener. The caller holds the writer lock.
    fn notify(&self, revision: u64, state: &Arc<ComposedState>) {
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(revision, state);
        }
    }

    /// Number of commits applied so far
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Call `listener` with the new state after every commit
    ///
    /// Dropping the returned [`Subscription`] unsubscribes.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Arc<ComposedState>) + Send + Sync + 'static,
    {
        self.register(Arc::new(move |_: u64, state: &Arc<ComposedState>| listener(state)))
    }

    /// Call `listener` with the current state now and after every commit.
    ///
    /// No commit can slip between the first call and the registration.
    pub(crate) fn observe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(u64, &Arc<ComposedState>) + Send + Sync + 'static,
    {
        let _writer = self.inner.writer.lock();
        listener(self.revision(), &self.get_state());
        self.register(Arc::new(listener))
    }

    fn register(&self, listener: Listener) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, listener));

        Subscription {
            store: Arc::downgrade(&self.inner),
            id,
            active: true,
        }
    }

    /// A live projection of the state
    ///
    /// The selection only reports a change when the projected value changes.
    ///
    /// ```ignore
    /// let mut fish_count = store.select(|state| state.get(&FISH).map(|f| f.count));
    /// fish_count.changed().await?;
    /// ```
    pub fn select<U, F>(&self, selector: F) -> Selection<U>
    where
        U: PartialEq + Send + Sync + 'static,
        F: Fn(&ComposedState) -> U + Send + Sync + 'static,
    {
        let _writer = self.inner.writer.lock();
        let (sender, receiver) = watch::channel(Revised {
            revision: self.revision(),
            value: selector(&self.get_state()),
        });
        let subscription = self.register(Arc::new(move |revision: u64, state: &Arc<ComposedState>| {
            let next = selector(state);
            sender.send_if_modified(|current| {
                if revision <= current.revision {
                    return false;
                }
                current.revision = revision;
                if current.value == next {
                    false
                } else {
                    current.value = next;
                    true
                }
            });
        }));

        Selection {
            current: receiver,
            _subscription: subscription,
        }
    }

    /// The persistence layer, if this store persists its state
    #[must_use]
    pub fn persist(&self) -> Option<&PersistHandle> {
        self.inner.persist.get()
    }

    /// Number of registered subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.get_state())
            .field("persist", &self.persist().map(PersistHandle::name))
            .finish_non_exhaustive()
    }
}

/// A weak reference to a [`Store`]
///
/// Handed to slices so their actions can reach the parent store without
/// keeping it alive. Also the escape hatch for cross-slice reads and writes.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Weak<StoreInner>,
}

impl StoreHandle {
    /// The store, if it is still alive
    #[must_use]
    pub fn upgrade(&self) -> Option<Store> {
        self.inner.upgrade().map(|inner| Store { inner })
    }

    /// The store, or [`StoreError::StoreDropped`]
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreDropped`] if every strong handle is gone.
    pub fn store(&self) -> Result<Store, StoreError> {
        self.upgrade().ok_or(StoreError::StoreDropped)
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// Registration of a store listener; dropping it unsubscribes
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    store: Weak<StoreInner>,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Unsubscribe now
    pub fn unsubscribe(self) {
        drop(self);
    }

    /// Keep the listener registered for the rest of the store's life
    pub fn detach(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        if let Some(inner) = self.store.upgrade() {
            lock(&inner.listeners).retain(|(id, _)| *id != self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

/// A projected value tagged with the revision it was computed from
struct Revised<U> {
    revision: u64,
    value: U,
}

/// A live, selector-based projection of a store's state
///
/// Deliveries older than the held value are dropped, so the selection never
/// moves back to a stale projection.
pub struct Selection<U> {
    current: watch::Receiver<Revised<U>>,
    _subscription: Subscription,
}

/// Borrowed projected value of a [`Selection`]
pub struct SelectionRef<'a, U> {
    inner: watch::Ref<'a, Revised<U>>,
}

impl<U> Deref for SelectionRef<'_, U> {
    type Target = U;

    fn deref(&self) -> &U {
        &self.inner.value
    }
}

impl<U> Selection<U> {
    /// Borrow the current projected value
    pub fn borrow(&self) -> SelectionRef<'_, U> {
        SelectionRef {
            inner: self.current.borrow(),
        }
    }

    /// Revision of the commit the current value was computed from
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.current.borrow().revision
    }

    /// Whether the value changed since it was last observed via [`changed`](Self::changed)
    #[must_use]
    pub fn has_changed(&self) -> bool {
        self.current.has_changed().unwrap_or(false)
    }

    /// Wait until the projected value changes
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreDropped`] if the store goes away first.
    pub async fn changed(&mut self) -> Result<(), StoreError> {
        self.current
            .changed()
            .await
            .map_err(|_| StoreError::StoreDropped)
    }
}

impl<U: Clone> Selection<U> {
    /// Clone of the current projected value
    #[must_use]
    pub fn get(&self) -> U {
        self.current.borrow().value.clone()
    }
}

impl<U: fmt::Debug> fmt::Debug for Selection<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selection").field(&self.current.borrow().value).finish()
    }
}
