//! Error types for the todo client and the sync layer.
//!
//! # Design
//! `ApiError` describes what went wrong with one HTTP exchange. `StoreError`
//! is the single value every remote operation reports to callers; it only
//! distinguishes the three cases a caller can act on. Nothing is retried
//! automatically, so no variant carries retry hints.

use thiserror::Error;

use crate::types::TodoId;

/// Errors returned by `TodoClient` build and parse methods.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server returned 404; the requested todo does not exist.
    #[error("resource not found")]
    NotFound,

    /// The server returned a non-2xx status other than 404.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),
}

/// Errors reported by a `RemoteStore` and surfaced by the sync layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The operation referenced a todo the store does not hold.
    #[error("todo not found{}", .0.map(|id| format!(": {id}")).unwrap_or_default())]
    NotFound(Option<TodoId>),

    /// The input was malformed, e.g. an out-of-range move or a bad field.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The store could not be reached or answered unexpectedly.
    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// NotFound naming the todo that was missing.
    pub fn not_found(id: TodoId) -> Self {
        StoreError::NotFound(Some(id))
    }

    /// True for NotFound, whether or not the id is known.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound => StoreError::NotFound(None),
            ApiError::HttpError { status: 400 | 422, body } => StoreError::Validation(body),
            ApiError::HttpError { status, body } => {
                StoreError::Transport(format!("HTTP {status}: {body}"))
            }
            ApiError::SerializationError(msg) => StoreError::Validation(msg),
            ApiError::DeserializationError(msg) => StoreError::Transport(msg),
        }
    }
}
