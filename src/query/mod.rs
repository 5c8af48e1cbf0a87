//! Read-only query API over harvested data
//!
//! [`QueryService`] validates parameters before touching storage, so bad
//! input surfaces as a client error instead of a storage fault.

mod service;

pub use service::{QueryService, SessionOverview, DEFAULT_LIMIT, MAX_LIMIT, MAX_SEARCH_TERM_CHARS};

use crate::storage::StorageError;
use thiserror::Error;

/// Errors returned by [`QueryService`]
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QueryError {
    /// True for errors caused by the caller's input (the 4xx family)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::BadRequest(_))
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
