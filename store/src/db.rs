//! In-memory todo table.
//!
//! Every mutation takes the write lock once, so a reorder batch is checked
//! and applied without any reader observing a half-applied state.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{CreateTodo, NewPosition, Todo, UpdateTodo};

#[derive(Clone, Default)]
pub struct TodoStore {
    todos: Arc<RwLock<HashMap<Uuid, Todo>>>,
}

impl TodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn list(&self) -> Vec<Todo> {
        self.todos.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: Uuid) -> Result<Todo, StoreError> {
        self.todos
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    /// Appends a todo at the end of the list (`position` = current count).
    pub async fn create(&self, input: CreateTodo) -> Todo {
        let mut todos = self.todos.write().await;
        let now = Utc::now();
        let todo = Todo {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            is_completed: false,
            created_at: now,
            updated_at: now,
            due_date: input.due_date,
            priority: input.priority,
            tags: input.tags,
            position: todos.len() as i64,
        };
        todos.insert(todo.id, todo.clone());
        tracing::info!(id = %todo.id, position = todo.position, "created todo");
        todo
    }

    pub async fn update(&self, id: Uuid, input: UpdateTodo) -> Result<Todo, StoreError> {
        let mut todos = self.todos.write().await;
        let todo = todos.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = input.title {
            todo.title = title;
        }
        if let Some(description) = input.description {
            todo.description = Some(description);
        }
        if let Some(is_completed) = input.is_completed {
            todo.is_completed = is_completed;
        }
        if let Some(due_date) = input.due_date {
            todo.due_date = Some(due_date);
        }
        if let Some(priority) = input.priority {
            todo.priority = priority;
        }
        if let Some(tags) = input.tags {
            todo.tags = Some(tags);
        }
        todo.updated_at = touched(todo.updated_at);
        tracing::info!(%id, "updated todo");
        Ok(todo.clone())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut todos = self.todos.write().await;
        todos.remove(&id).ok_or(StoreError::NotFound(id))?;
        tracing::info!(%id, "deleted todo");
        Ok(())
    }

    /// Applies a batch of position updates all-or-nothing: an unknown or
    /// repeated id rejects the whole batch before anything is written.
    pub async fn reorder(&self, new_positions: &[NewPosition]) -> Result<(), StoreError> {
        let mut todos = self.todos.write().await;

        let mut seen = HashSet::with_capacity(new_positions.len());
        for entry in new_positions {
            if !todos.contains_key(&entry.id) {
                tracing::info!(id = %entry.id, "reorder rejected, unknown todo");
                return Err(StoreError::NotFound(entry.id));
            }
            if !seen.insert(entry.id) {
                return Err(StoreError::InvalidInput(format!(
                    "todo {} appears more than once in reorder batch",
                    entry.id
                )));
            }
        }

        for entry in new_positions {
            if let Some(todo) = todos.get_mut(&entry.id) {
                todo.position = entry.new_position;
                todo.updated_at = touched(todo.updated_at);
            }
        }
        tracing::info!(count = new_positions.len(), "reordered todos");
        Ok(())
    }
}

/// The store's clock for `updatedAt`: never earlier than the previous value.
fn touched(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Priority;

    fn input(title: &str) -> CreateTodo {
        CreateTodo {
            title: title.to_string(),
            description: None,
            due_date: None,
            priority: Priority::Low,
            tags: None,
        }
    }

    #[tokio::test]
    async fn create_appends_at_end() {
        let store = TodoStore::new();
        let a = store.create(input("A")).await;
        let b = store.create(input("B")).await;
        assert_eq!(a.position, 0);
        assert_eq!(b.position, 1);
        assert!(!a.is_completed);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn update_leaves_absent_fields_alone() {
        let store = TodoStore::new();
        let a = store.create(input("A")).await;
        let updated = store
            .update(
                a.id,
                UpdateTodo {
                    is_completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.is_completed);
        assert_eq!(updated.title, "A");
        assert_eq!(updated.position, 0);
        assert!(updated.updated_at >= a.updated_at);
    }

    #[tokio::test]
    async fn reorder_with_unknown_id_changes_nothing() {
        let store = TodoStore::new();
        let a = store.create(input("A")).await;
        let b = store.create(input("B")).await;
        let missing = Uuid::new_v4();

        let err = store
            .reorder(&[
                NewPosition { id: b.id, new_position: 0 },
                NewPosition { id: missing, new_position: 1 },
                NewPosition { id: a.id, new_position: 2 },
            ])
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(missing));

        assert_eq!(store.get(a.id).await.unwrap().position, 0);
        assert_eq!(store.get(b.id).await.unwrap().position, 1);
    }

    #[tokio::test]
    async fn reorder_rejects_repeated_id() {
        let store = TodoStore::new();
        let a = store.create(input("A")).await;
        let err = store
            .reorder(&[
                NewPosition { id: a.id, new_position: 0 },
                NewPosition { id: a.id, new_position: 1 },
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));
        assert_eq!(store.get(a.id).await.unwrap().position, 0);
    }

    #[tokio::test]
    async fn delete_twice_is_not_found() {
        let store = TodoStore::new();
        let a = store.create(input("A")).await;
        store.delete(a.id).await.unwrap();
        assert_eq!(store.delete(a.id).await, Err(StoreError::NotFound(a.id)));
        assert!(store.list().await.is_empty());
    }

    #[test]
    fn touched_never_goes_backwards() {
        let future = Utc::now() + chrono::Duration::hours(1);
        assert_eq!(touched(future), future);
    }
}
