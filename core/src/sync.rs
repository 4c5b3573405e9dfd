//! Optimistic sync layer over a `RemoteStore`.
//!
//! # Design
//! The cached collection lives in a `tokio::sync::watch` channel. `TodoSync`
//! owns the only `Sender`; renderers hold `Receiver`s and never write. Every
//! mutation goes through `Shared::run`, which bumps the `saving` count for
//! the duration of the call and records the outcome in `error`.
//!
//! Reorders are applied to the cache before the request is sent. If the
//! store rejects the batch and no other reorder touched the cache meanwhile,
//! the positions captured beforehand are put back. When reorders overlapped,
//! a snapshot no longer describes the store, so once the last of them has
//! settled the positions are read back from the store instead.
//!
//! Title edits are shown in the cache at once and reach the store through a
//! per-record `Debouncer`. Records read from the store are overlaid with any
//! title the store has not acknowledged yet.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::debounce::{Debouncer, EditSink, EditState};
use crate::error::StoreError;
use crate::remote::RemoteStore;
use crate::reorder::{apply_positions, display_order, plan_move, plan_move_by_id};
use crate::types::{NewTodo, PositionUpdate, Todo, TodoId, TodoPatch};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last keystroke before a title is sent.
    pub debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

impl SyncConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// What renderers see.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    /// Display order.
    pub todos: Vec<Todo>,
    /// Mutations currently awaiting the store.
    pub saving: usize,
    /// Outcome of the most recent mutation that failed, cleared by the next
    /// one that succeeds.
    pub error: Option<StoreError>,
}

impl Collection {
    pub fn is_saving(&self) -> bool {
        self.saving > 0
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.todos.iter().find(|t| t.id == id)
    }

    pub fn ids(&self) -> Vec<TodoId> {
        self.todos.iter().map(|t| t.id).collect()
    }

    fn upsert(&mut self, todo: Todo) {
        match self.todos.iter_mut().find(|t| t.id == todo.id) {
            Some(existing) => *existing = todo,
            None => self.todos.push(todo),
        }
        display_order(&mut self.todos);
    }
}

/// Bookkeeping for optimistic reorders.
#[derive(Default)]
struct Reorders {
    /// Generation of the most recently applied batch.
    latest: u64,
    in_flight: usize,
    /// A failed batch could not be rolled back from its snapshot.
    stale: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared<S> {
    store: S,
    state: watch::Sender<Collection>,
    reorders: Mutex<Reorders>,
    /// Ids whose delete request has not been answered.
    deleting: Mutex<HashSet<TodoId>>,
}

impl<S: RemoteStore> Shared<S> {
    fn contains(&self, id: TodoId) -> bool {
        self.state.borrow().get(id).is_some()
    }

    fn is_gone(&self, id: TodoId) -> bool {
        lock(&self.deleting).contains(&id) || !self.contains(id)
    }

    async fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        self.state.send_modify(|c| c.saving += 1);
        let result = op.await;
        self.state.send_modify(|c| {
            c.saving = c.saving.saturating_sub(1);
            c.error = result.as_ref().err().cloned();
        });
        result
    }

    async fn reorder_optimistically(&self, batch: Vec<PositionUpdate>) -> Result<(), StoreError> {
        let mut previous = Vec::new();
        let mut generation = 0;
        self.state.send_modify(|c| {
            previous = current_positions(&c.todos);
            apply_positions(&mut c.todos, &batch);
            display_order(&mut c.todos);

            let mut reorders = lock(&self.reorders);
            reorders.latest += 1;
            reorders.in_flight += 1;
            generation = reorders.latest;
        });

        let result = self.run(self.store.reorder_todos(&batch)).await;

        // The cache lock is always taken before the ledger lock.
        let mut resync = false;
        self.state.send_modify(|c| {
            let mut reorders = lock(&self.reorders);
            reorders.in_flight -= 1;
            if let Err(err) = &result {
                if reorders.latest == generation && reorders.in_flight == 0 {
                    tracing::warn!(error = %err, "reorder rejected, restoring previous order");
                    apply_positions(&mut c.todos, &previous);
                    display_order(&mut c.todos);
                } else {
                    tracing::warn!(error = %err, "reorder rejected while others were pending");
                    reorders.stale = true;
                }
            }
            resync = reorders.in_flight == 0 && reorders.stale;
        });
        if resync {
            self.resync_positions().await;
        }
        result
    }

    /// Replace cached positions with the store's. Skipped if another reorder
    /// starts before the answer arrives; that one resyncs when it settles.
    async fn resync_positions(&self) {
        let generation = {
            let mut reorders = lock(&self.reorders);
            reorders.stale = false;
            reorders.latest
        };

        self.state.send_modify(|c| c.saving += 1);
        let result = self.store.get_todos().await;
        self.state.send_modify(|c| {
            c.saving = c.saving.saturating_sub(1);
            let mut reorders = lock(&self.reorders);
            match &result {
                Ok(todos) if reorders.latest == generation => {
                    apply_positions(&mut c.todos, &current_positions(todos));
                    display_order(&mut c.todos);
                    tracing::debug!("positions resynced from store");
                }
                Ok(_) => reorders.stale = true,
                Err(err) => {
                    tracing::warn!(error = %err, "could not resync positions");
                    reorders.stale = true;
                }
            }
        });
    }
}

fn current_positions(todos: &[Todo]) -> Vec<PositionUpdate> {
    todos
        .iter()
        .map(|t| PositionUpdate {
            id: t.id,
            new_position: t.position,
        })
        .collect()
}

/// Where debounced titles go: an update through the shared store.
struct TitleSink<S> {
    shared: Arc<Shared<S>>,
}

#[async_trait]
impl<S: RemoteStore + 'static> EditSink for TitleSink<S> {
    async fn send(&self, id: TodoId, title: String) -> Result<(), StoreError> {
        let shared = &self.shared;
        shared.state.send_modify(|c| c.saving += 1);
        let result = shared.store.update_todo(id, &TodoPatch::title(title)).await;

        // A record deleted while its edit was in flight is not the user's
        // problem; the failure is logged and nothing else.
        let orphaned = matches!(&result, Err(err) if err.is_not_found()) && shared.is_gone(id);
        shared.state.send_modify(|c| {
            c.saving = c.saving.saturating_sub(1);
            match &result {
                Ok(saved) => {
                    if let Some(cached) = c.todos.iter_mut().find(|t| t.id == id) {
                        cached.updated_at = saved.updated_at;
                    }
                    c.error = None;
                }
                Err(_) if orphaned => {}
                Err(err) => c.error = Some(err.clone()),
            }
        });
        if orphaned {
            tracing::debug!(%id, "dropped title edit for deleted todo");
        }
        result.map(|_| ())
    }
}

pub struct TodoSync<S> {
    shared: Arc<Shared<S>>,
    titles: Debouncer<TitleSink<S>>,
}

impl<S> Clone for TodoSync<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            titles: self.titles.clone(),
        }
    }
}

impl<S: RemoteStore + 'static> TodoSync<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, SyncConfig::default())
    }

    pub fn with_config(store: S, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(Collection::default());
        let shared = Arc::new(Shared {
            store,
            state,
            reorders: Mutex::new(Reorders::default()),
            deleting: Mutex::new(HashSet::new()),
        });
        let titles = Debouncer::new(
            config.debounce,
            TitleSink {
                shared: Arc::clone(&shared),
            },
        );
        Self { shared, titles }
    }

    pub fn subscribe(&self) -> watch::Receiver<Collection> {
        self.shared.state.subscribe()
    }

    pub fn snapshot(&self) -> Collection {
        self.shared.state.borrow().clone()
    }

    pub fn store(&self) -> &S {
        &self.shared.store
    }

    /// Replace the cache with the store's collection.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let shared = &self.shared;
        let mut todos = shared.run(shared.store.get_todos()).await?;
        display_order(&mut todos);
        self.keep_unsent_titles(&mut todos);
        tracing::debug!(count = todos.len(), "refreshed todos");
        shared.state.send_modify(|c| c.todos = todos);
        Ok(())
    }

    pub async fn create(&self, input: NewTodo) -> Result<Todo, StoreError> {
        let shared = &self.shared;
        let todo = shared.run(shared.store.create_todo(&input)).await?;
        shared.state.send_modify(|c| c.upsert(todo.clone()));
        Ok(todo)
    }

    pub async fn create_titled(&self, title: impl Into<String>) -> Result<Todo, StoreError> {
        self.create(NewTodo::titled(title)).await
    }

    pub async fn update(&self, id: TodoId, patch: TodoPatch) -> Result<Todo, StoreError> {
        let shared = &self.shared;
        let todo = shared.run(shared.store.update_todo(id, &patch)).await?;
        let mut cached = todo.clone();
        self.keep_unsent_titles(std::slice::from_mut(&mut cached));
        shared.state.send_modify(|c| c.upsert(cached));
        Ok(todo)
    }

    /// Flip completion of a cached todo.
    pub async fn toggle(&self, id: TodoId) -> Result<Todo, StoreError> {
        let current = self
            .shared
            .state
            .borrow()
            .get(id)
            .map(|t| t.is_completed)
            .ok_or(StoreError::not_found(id))?;
        self.update(id, TodoPatch::completed(!current)).await
    }

    /// Delete a todo. A store that no longer knows the id counts as success.
    pub async fn delete(&self, id: TodoId) -> Result<(), StoreError> {
        self.titles.cancel(id);
        let shared = &self.shared;
        lock(&shared.deleting).insert(id);
        let result = shared
            .run(async {
                match shared.store.delete_todo(id).await {
                    Err(err) if err.is_not_found() => {
                        tracing::debug!(%id, "todo already absent from store");
                        Ok(())
                    }
                    other => other,
                }
            })
            .await;
        lock(&shared.deleting).remove(&id);
        result?;
        shared
            .state
            .send_modify(|c| c.todos.retain(|t| t.id != id));
        Ok(())
    }

    /// Move the todo at display index `from` to index `to`.
    pub async fn move_item(&self, from: usize, to: usize) -> Result<(), StoreError> {
        let ids = self.shared.state.borrow().ids();
        match plan_move(&ids, from, to)? {
            Some(batch) => self.shared.reorder_optimistically(batch).await,
            None => Ok(()),
        }
    }

    /// Drop `active` onto the slot held by `over`.
    pub async fn move_by_id(&self, active: TodoId, over: TodoId) -> Result<(), StoreError> {
        let ids = self.shared.state.borrow().ids();
        match plan_move_by_id(&ids, active, over)? {
            Some(batch) => self.shared.reorder_optimistically(batch).await,
            None => Ok(()),
        }
    }

    /// A keystroke in a title editor. The cache shows `title` immediately;
    /// the store gets it once the record has been quiet for the debounce
    /// window.
    pub fn edit_title(&self, id: TodoId, title: impl Into<String>) {
        let title = title.into();
        self.shared.state.send_modify(|c| {
            if let Some(cached) = c.todos.iter_mut().find(|t| t.id == id) {
                cached.title = title.clone();
            }
        });
        self.titles.edit(id, title);
    }

    /// Records fresh from the store still show titles the user typed but
    /// the store has not acknowledged.
    fn keep_unsent_titles(&self, todos: &mut [Todo]) {
        let unsent: HashMap<TodoId, String> = self.titles.unsettled_values();
        if unsent.is_empty() {
            return;
        }
        for todo in todos {
            if let Some(title) = unsent.get(&todo.id) {
                todo.title = title.clone();
            }
        }
    }

    pub fn edit_state(&self, id: TodoId) -> EditState {
        self.titles.state(id)
    }

    /// Send all pending title edits without waiting for their timers.
    pub async fn flush_edits(&self) {
        self.titles.flush().await;
    }
}
