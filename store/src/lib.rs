//! In-memory stand-in for the remote todo document store, served over HTTP.

pub mod db;
pub mod error;
pub mod model;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use uuid::Uuid;

pub use db::TodoStore;
pub use error::StoreError;
pub use model::{CreateTodo, NewPosition, Priority, ReorderTodos, Todo, UpdateTodo};

pub fn app() -> Router {
    router(TodoStore::new())
}

/// Router over an existing store, so callers can inspect the table directly.
pub fn router(store: TodoStore) -> Router {
    Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/reorder", post(reorder_todos))
        .route("/todos/{id}", get(get_todo).put(update_todo).delete(delete_todo))
        .with_state(store)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_todos(State(store): State<TodoStore>) -> Json<Vec<Todo>> {
    Json(store.list().await)
}

async fn create_todo(
    State(store): State<TodoStore>,
    Json(input): Json<CreateTodo>,
) -> (StatusCode, Json<Todo>) {
    (StatusCode::CREATED, Json(store.create(input).await))
}

async fn get_todo(
    State(store): State<TodoStore>,
    Path(id): Path<Uuid>,
) -> Result<Json<Todo>, StoreError> {
    store.get(id).await.map(Json)
}

async fn update_todo(
    State(store): State<TodoStore>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTodo>,
) -> Result<Json<Todo>, StoreError> {
    store.update(id, input).await.map(Json)
}

async fn delete_todo(
    State(store): State<TodoStore>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StoreError> {
    store.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn reorder_todos(
    State(store): State<TodoStore>,
    Json(input): Json<ReorderTodos>,
) -> Result<StatusCode, StoreError> {
    store.reorder(&input.new_positions).await?;
    Ok(StatusCode::NO_CONTENT)
}
