//! In-process fake of the remote store.
//!
//! Behaves like the real store (append-at-end, strict NotFound, atomic
//! reorder) and additionally counts calls, records title sends with their
//! time, and can be told to fail or stall.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use todo_sync::{NewTodo, PositionUpdate, RemoteStore, StoreError, Todo, TodoId, TodoPatch};
use uuid::Uuid;

#[derive(Default)]
struct State {
    todos: HashMap<TodoId, Todo>,
    reorder_calls: usize,
    title_sends: Vec<(TodoId, String, Instant)>,
    fail_next_reorder: Option<StoreError>,
    delay_next_reorder: Duration,
    update_latency: Duration,
    delete_latency: Duration,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reorder_calls(&self) -> usize {
        self.state.lock().unwrap().reorder_calls
    }

    pub fn title_sends(&self) -> Vec<(TodoId, String, Instant)> {
        self.state.lock().unwrap().title_sends.clone()
    }

    pub fn fail_next_reorder(&self, err: StoreError) {
        self.state.lock().unwrap().fail_next_reorder = Some(err);
    }

    /// The next reorder waits this long before it is applied or failed.
    pub fn delay_next_reorder(&self, delay: Duration) {
        self.state.lock().unwrap().delay_next_reorder = delay;
    }

    /// Deletes take effect at once but answer only after `latency`.
    pub fn set_delete_latency(&self, latency: Duration) {
        self.state.lock().unwrap().delete_latency = latency;
    }

    pub fn set_update_latency(&self, latency: Duration) {
        self.state.lock().unwrap().update_latency = latency;
    }

    pub fn get(&self, id: TodoId) -> Option<Todo> {
        self.state.lock().unwrap().todos.get(&id).cloned()
    }

    /// Titles in store order.
    pub fn titles_by_position(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut todos: Vec<&Todo> = state.todos.values().collect();
        todos.sort_by_key(|t| t.position);
        todos.iter().map(|t| t.title.clone()).collect()
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn create_todo(&self, input: &NewTodo) -> Result<Todo, StoreError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let todo = Todo {
            id: TodoId(Uuid::new_v4()),
            title: input.title.clone(),
            description: input.description.clone(),
            is_completed: false,
            created_at: now,
            updated_at: now,
            due_date: input.due_date,
            priority: input.priority,
            tags: input.tags.clone(),
            position: state.todos.len() as i64,
        };
        state.todos.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn get_todos(&self) -> Result<Vec<Todo>, StoreError> {
        Ok(self.state.lock().unwrap().todos.values().cloned().collect())
    }

    async fn update_todo(&self, id: TodoId, patch: &TodoPatch) -> Result<Todo, StoreError> {
        let latency = {
            let mut state = self.state.lock().unwrap();
            if let Some(title) = &patch.title {
                state.title_sends.push((id, title.clone(), Instant::now()));
            }
            state.update_latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().unwrap();
        let todo = state
            .todos
            .get_mut(&id)
            .ok_or(StoreError::not_found(id))?;
        patch.apply_to(todo);
        todo.updated_at = Utc::now().max(todo.updated_at);
        Ok(todo.clone())
    }

    async fn delete_todo(&self, id: TodoId) -> Result<(), StoreError> {
        let (removed, latency) = {
            let mut state = self.state.lock().unwrap();
            (state.todos.remove(&id), state.delete_latency)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        removed.map(|_| ()).ok_or(StoreError::not_found(id))
    }

    async fn reorder_todos(&self, new_positions: &[PositionUpdate]) -> Result<(), StoreError> {
        let (failure, delay) = {
            let mut state = self.state.lock().unwrap();
            state.reorder_calls += 1;
            let delay = std::mem::take(&mut state.delay_next_reorder);
            (state.fail_next_reorder.take(), delay)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let mut state = self.state.lock().unwrap();
        if let Some(missing) = new_positions
            .iter()
            .find(|u| !state.todos.contains_key(&u.id))
        {
            return Err(StoreError::not_found(missing.id));
        }
        for update in new_positions {
            if let Some(todo) = state.todos.get_mut(&update.id) {
                todo.position = update.new_position;
                todo.updated_at = Utc::now().max(todo.updated_at);
            }
        }
        Ok(())
    }
}
