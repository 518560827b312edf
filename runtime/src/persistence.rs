//! Persistence layer.
//!
//! Persistence decorates a store without changing how it is mutated: it
//! subscribes to commits and hands each new snapshot to a single actor task
//! that owns all storage I/O.
//!
//! The actor first rehydrates the store (read, version check, merge into the
//! current state, write back), then processes commands in order. Consecutive
//! flushes are coalesced so only the newest state is written.
//!
//! Read failures, malformed snapshots and version mismatches are treated as
//! "nothing persisted". They are logged and never reach callers.

use crate::error::StoreError;
use crate::metrics::PersistMetrics;
use crate::store::{Store, StoreHandle};
use serde_json::Value;
use slicestore_core::{ComposedState, PersistConfig, PersistedEnvelope, StateStorage};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};

type Reply = oneshot::Sender<Result<(), StoreError>>;

enum Command {
    /// Write the store's state. `state` is the snapshot at commit time, used
    /// when the store itself is already gone.
    Flush {
        state: Option<Arc<ComposedState>>,
        done: Option<Reply>,
    },
    Rehydrate {
        done: Reply,
    },
    Clear {
        done: Reply,
    },
}

/// Control surface of a store's persistence layer
///
/// Obtained from [`Store::persist`].
#[derive(Clone)]
pub struct PersistHandle {
    config: PersistConfig,
    commands: mpsc::UnboundedSender<Command>,
    hydrated: watch::Receiver<bool>,
}

impl PersistHandle {
    /// Storage entry name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Snapshot version
    #[must_use]
    pub const fn version(&self) -> u32 {
        self.config.version
    }

    /// Whether the latest rehydration has completed
    #[must_use]
    pub fn has_hydrated(&self) -> bool {
        *self.hydrated.borrow()
    }

    /// Wait until the store has been rehydrated
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PersistenceStopped`] if the actor exits first.
    pub async fn wait_for_hydration(&self) -> Result<(), StoreError> {
        let mut hydrated = self.hydrated.clone();
        hydrated
            .wait_for(|done| *done)
            .await
            .map(|_| ())
            .map_err(|_| StoreError::PersistenceStopped)
    }

    /// Reload the persisted snapshot and merge it into the current state
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PersistenceStopped`] if the actor is not running.
    pub async fn rehydrate(&self) -> Result<(), StoreError> {
        self.request(|done| Command::Rehydrate { done }).await
    }

    /// Write the current state now and wait for the write to finish
    ///
    /// # Errors
    ///
    /// - [`StoreError::Storage`] if the backend rejects the write
    /// - [`StoreError::PersistenceStopped`] if the actor is not running
    pub async fn flush(&self) -> Result<(), StoreError> {
        self.request(|done| Command::Flush {
            state: None,
            done: Some(done),
        })
        .await
    }

    /// Remove the persisted snapshot
    ///
    /// The in-memory state is untouched; the next commit writes it again.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Storage`] if the backend rejects the removal
    /// - [`StoreError::PersistenceStopped`] if the actor is not running
    pub async fn clear_storage(&self) -> Result<(), StoreError> {
        self.request(|done| Command::Clear { done }).await
    }

    async fn request<F>(&self, command: F) -> Result<(), StoreError>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (done, reply) = oneshot::channel();
        self.commands
            .send(command(done))
            .map_err(|_| StoreError::PersistenceStopped)?;
        reply.await.map_err(|_| StoreError::PersistenceStopped)?
    }
}

impl fmt::Debug for PersistHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistHandle")
            .field("name", &self.config.name)
            .field("version", &self.config.version)
            .field("hydrated", &self.has_hydrated())
            .finish()
    }
}

/// Decorate `store` with persistence to `storage`.
///
/// Requires a tokio runtime; without one the store stays in memory only.
pub(crate) fn attach(store: &Store, config: PersistConfig, storage: Arc<dyn StateStorage>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        tracing::warn!(
            name = %config.name,
            "No tokio runtime available, store will not be persisted"
        );
        return;
    };

    let (commands, receiver) = mpsc::unbounded_channel();
    let (hydrated_tx, hydrated) = watch::channel(false);

    store
        .subscribe({
            let commands = commands.clone();
            move |state| {
                // A closed channel means the actor has stopped; nothing left to flush to.
                let _ = commands.send(Command::Flush {
                    state: Some(Arc::clone(state)),
                    done: None,
                });
            }
        })
        .detach();

    store.attach_persist(PersistHandle {
        config: config.clone(),
        commands,
        hydrated,
    });

    let actor = PersistActor {
        store: store.handle(),
        storage,
        config,
        hydrated: hydrated_tx,
    };
    runtime.spawn(actor.run(receiver));
}

struct PersistActor {
    store: StoreHandle,
    storage: Arc<dyn StateStorage>,
    config: PersistConfig,
    hydrated: watch::Sender<bool>,
}

impl PersistActor {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        self.hydrate().await;

        let mut pending: Option<Command> = None;
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match commands.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                Command::Flush { mut state, done } => {
                    let mut waiters: Vec<Reply> = done.into_iter().collect();
                    while let Ok(next) = commands.try_recv() {
                        match next {
                            Command::Flush {
                                state: newer,
                                done,
                            } => {
                                if newer.is_some() {
                                    state = newer;
                                }
                                waiters.extend(done);
                            },
                            other => {
                                pending = Some(other);
                                break;
                            },
                        }
                    }

                    let result = self.flush(state).await;
                    if let Err(error) = &result {
                        if waiters.is_empty() {
                            tracing::warn!(%error, "Failed to persist state");
                        }
                    }
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                },
                Command::Rehydrate { done } => {
                    self.hydrated.send_replace(false);
                    self.hydrate().await;
                    let _ = done.send(Ok(()));
                },
                Command::Clear { done } => {
                    let result = self
                        .storage
                        .remove_item(&self.config.name)
                        .await
                        .map_err(StoreError::from);
                    match &result {
                        Ok(()) => tracing::debug!(name = %self.config.name, "Cleared persisted state"),
                        Err(_) => PersistMetrics::record_failure("clear"),
                    }
                    let _ = done.send(result);
                },
            }
        }

        tracing::debug!(name = %self.config.name, "Persistence actor stopped");
    }

    /// Load, check and merge the persisted snapshot, then write the result back.
    #[tracing::instrument(skip(self), fields(name = %self.config.name, version = self.config.version))]
    async fn hydrate(&self) {
        let bytes = match self.storage.get_item(&self.config.name).await {
            Ok(bytes) => bytes,
            Err(error) => {
                PersistMetrics::record_failure("read");
                tracing::warn!(%error, "Failed to read persisted state, using defaults");
                None
            },
        };

        let persisted: Option<Value> =
            PersistedEnvelope::usable_state(bytes.as_deref(), self.config.version);
        if bytes.is_some() && persisted.is_none() {
            tracing::debug!("Discarding persisted state: malformed or written under another version");
        }

        let Some(store) = self.store.upgrade() else {
            return;
        };

        let rehydration = store.rehydrate_from(persisted.as_ref());
        for failure in &rehydration.failures {
            tracing::warn!(
                slice = %failure.key,
                error = %failure.error,
                "Persisted slice state rejected, keeping defaults"
            );
        }
        tracing::debug!(merged = ?rehydration.merged, "Rehydrated store");
        PersistMetrics::record_rehydration();
        self.hydrated.send_replace(true);

        let state = store.get_state();
        drop(store);
        if let Err(error) = self.write(&state).await {
            tracing::warn!(%error, "Failed to write rehydrated state");
        }
    }

    /// Write the live state, or `fallback` if the store has been dropped.
    async fn flush(&self, fallback: Option<Arc<ComposedState>>) -> Result<(), StoreError> {
        let state = match self.store.upgrade() {
            Some(store) => store.get_state(),
            None => match fallback {
                Some(state) => state,
                None => return Ok(()),
            },
        };
        self.write(&state).await
    }

    async fn write(&self, state: &ComposedState) -> Result<(), StoreError> {
        let started = Instant::now();
        let result = self.encode(state);
        let result = match result {
            Ok(bytes) => self
                .storage
                .set_item(&self.config.name, bytes)
                .await
                .map_err(StoreError::from),
            Err(error) => Err(error),
        };

        match &result {
            Ok(()) => {
                PersistMetrics::record_write(started.elapsed());
                tracing::trace!(name = %self.config.name, "Persisted state");
            },
            Err(_) => PersistMetrics::record_failure("write"),
        }
        result
    }

    fn encode(&self, state: &ComposedState) -> Result<Vec<u8>, StoreError> {
        let snapshot = Value::Object(state.to_json()?);
        Ok(PersistedEnvelope::new(snapshot, self.config.version).encode()?)
    }
}
