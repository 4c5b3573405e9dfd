//! Client core for a sortable todo list kept in sync with a remote store.
//!
//! # Overview
//! - `client` / `http`: builds `HttpRequest` values and parses `HttpResponse`
//!   values without touching the network (host-does-IO). A host `Transport`
//!   executes them.
//! - `remote`: the `RemoteStore` trait the rest of the crate talks to, and
//!   `HttpStore`, its implementation over `TodoClient` + `Transport`.
//! - `reorder`: pure planning of position batches for drag-and-drop moves.
//! - `debounce`: per-record coalescing of title edits.
//! - `sync`: `TodoSync`, the cached collection with optimistic reorders,
//!   rollback on failure, and debounced title edits.
//!
//! # Design
//! - DTOs are defined independently from the store crate; integration tests
//!   catch schema drift.
//! - Every remote failure is reported as one `StoreError` value. Nothing is
//!   retried automatically.

pub mod client;
pub mod debounce;
pub mod error;
pub mod http;
pub mod remote;
pub mod reorder;
pub mod sync;
pub mod types;

pub use client::TodoClient;
pub use debounce::{Debouncer, EditSink, EditState};
pub use error::{ApiError, StoreError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport};
pub use remote::{HttpStore, RemoteStore};
pub use sync::{Collection, SyncConfig, TodoSync, DEFAULT_DEBOUNCE};
pub use types::{NewTodo, PositionUpdate, Priority, ReorderTodos, Todo, TodoId, TodoPatch};
