//! Error types and result types for model and store operations.
//!
//! Two layers of errors exist:
//!
//! - [`StoreError`] is produced by store backends (the driver boundary) and is surfaced
//!   unchanged through every model operation.
//! - [`ModelError`] is what callers of model operations receive. It distinguishes missing
//!   connections, schema rejections, malformed identifiers, store failures and aborted
//!   paged reads.
//!
//! "Not found" is never an error: lookups return `Option::None` and mutations return
//! a count of zero.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all errors a store backend can report.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Error during client creation or connection setup.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// Serialization/deserialization error when converting between document formats.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A document with the given identifier already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The store refused the operation (malformed filter, update or pipeline).
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    /// The client owning the collection was closed.
    #[error("Client closed: {0}")]
    ClientClosed(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for store backend operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl From<BsonError> for StoreError {
    fn from(err: BsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for StoreError {
    fn from(err: SerdeJsonError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// A schema rejected a candidate document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Validation error: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Represents all errors returned by model operations.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No connection is registered under the given name.
    #[error("Db connection '{0}' not found")]
    ConnectionNotFound(String),
    /// The model schema rejected the data while constructing an instance.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A supplied identifier could not be converted into the store's identity type.
    #[error("Identity cast error: {0}")]
    IdentityCast(String),
    /// A failure reported by the store, passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// One of the sub-queries of a paged find failed.
    #[error("Paged find aborted: {0}")]
    PagingAborted(#[source] Box<ModelError>),
    /// Page or limit outside of their valid range.
    #[error("Invalid paging parameters: {0}")]
    InvalidPaging(String),
    /// A model instance could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

impl From<SerdeJsonError> for ModelError {
    fn from(err: SerdeJsonError) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl ModelError {
    /// Returns `true` when the error came from the store backend, including
    /// store failures that aborted a paged find.
    pub fn is_store_error(&self) -> bool {
        match self {
            ModelError::Store(_) => true,
            ModelError::PagingAborted(inner) => inner.is_store_error(),
            _ => false,
        }
    }
}
