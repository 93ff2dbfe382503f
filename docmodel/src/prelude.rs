//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```
//!
//! This provides access to:
//! - Model traits, schemas and the query proxy
//! - The connection registry and its configuration
//! - Operation options and shorthand adapters
//! - Page results and error types

pub use docmodel_core::{
    adapter::{Shorthand, fields_adapter, sort_adapter},
    backend::{StoreClient, StoreCollection, StoreConnector, StoreDatabase, UpdateOutcome},
    config::{ConnectOptions, ConnectionConfig},
    error::{ModelError, ModelResult, StoreError, StoreResult, ValidationError},
    identity::IntoObjectId,
    model::{Model, ModelExt},
    options::{
        AggregateOptions, CountOptions, DeleteOptions, FindAndModifyOptions, FindOptions, IndexSpec,
        MergeOptions, ReturnDocument, UpdateOptions,
    },
    page::{PageItems, PageNav, PageResult},
    proxy::ModelProxy,
    registry::{ConnectionRegistry, ConnectionSource, DEFAULT_CONNECTION, Handle},
    schema::{Permissive, Schema},
};
