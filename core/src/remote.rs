//! The remote store seam.
//!
//! `RemoteStore` is everything the sync layer needs from the document store.
//! `HttpStore` implements it by pairing `TodoClient` with a host `Transport`.

use async_trait::async_trait;

use crate::client::TodoClient;
use crate::error::StoreError;
use crate::http::Transport;
use crate::types::{NewTodo, PositionUpdate, Todo, TodoId, TodoPatch};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a todo at the end of the list.
    async fn create_todo(&self, input: &NewTodo) -> Result<Todo, StoreError>;

    /// Full collection in no particular order.
    async fn get_todos(&self) -> Result<Vec<Todo>, StoreError>;

    async fn update_todo(&self, id: TodoId, patch: &TodoPatch) -> Result<Todo, StoreError>;

    async fn delete_todo(&self, id: TodoId) -> Result<(), StoreError>;

    /// Apply a batch of positions all-or-nothing. Any unknown id fails the
    /// whole batch with `NotFound`.
    async fn reorder_todos(&self, new_positions: &[PositionUpdate]) -> Result<(), StoreError>;
}

/// `RemoteStore` over HTTP: requests come from `TodoClient`, the round-trip
/// is made by the host's `Transport`.
pub struct HttpStore<T> {
    client: TodoClient,
    transport: T,
}

impl<T: Transport> HttpStore<T> {
    /// A store rooted at `base_url`; a trailing slash is ignored.
    pub fn new(base_url: &str, transport: T) -> Self {
        Self {
            client: TodoClient::new(base_url),
            transport,
        }
    }
}

#[async_trait]
impl<T: Transport> RemoteStore for HttpStore<T> {
    async fn create_todo(&self, input: &NewTodo) -> Result<Todo, StoreError> {
        let req = self.client.build_create_todo(input)?;
        let resp = self.transport.execute(req).await?;
        Ok(self.client.parse_create_todo(resp)?)
    }

    async fn get_todos(&self) -> Result<Vec<Todo>, StoreError> {
        let req = self.client.build_list_todos();
        let resp = self.transport.execute(req).await?;
        Ok(self.client.parse_list_todos(resp)?)
    }

    async fn update_todo(&self, id: TodoId, patch: &TodoPatch) -> Result<Todo, StoreError> {
        let req = self.client.build_update_todo(id, patch)?;
        let resp = self.transport.execute(req).await?;
        self.client.parse_update_todo(resp).map_err(|e| with_id(e.into(), id))
    }

    async fn delete_todo(&self, id: TodoId) -> Result<(), StoreError> {
        let req = self.client.build_delete_todo(id);
        let resp = self.transport.execute(req).await?;
        self.client.parse_delete_todo(resp).map_err(|e| with_id(e.into(), id))
    }

    async fn reorder_todos(&self, new_positions: &[PositionUpdate]) -> Result<(), StoreError> {
        let req = self.client.build_reorder_todos(new_positions)?;
        let resp = self.transport.execute(req).await?;
        Ok(self.client.parse_reorder_todos(resp)?)
    }
}

fn with_id(err: StoreError, id: TodoId) -> StoreError {
    match err {
        StoreError::NotFound(None) => StoreError::not_found(id),
        other => other,
    }
}
