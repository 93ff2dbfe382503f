//! Store capability boundary.
//!
//! This module defines the traits a document store driver has to provide for models to
//! run against it. The traits mirror the driver's own object graph:
//!
//! - [`StoreConnector`] opens clients from a [`ConnectionConfig`]
//! - [`StoreClient`] owns the network session and hands out databases
//! - [`StoreDatabase`] hands out collections
//! - [`StoreCollection`] performs the collection-level operations
//!
//! Results come back in driver-native shapes (raw [`Document`]s, counts,
//! [`UpdateOutcome`]s); turning them into model instances is the job of the
//! [`normalize`](crate::normalize) module.
//!
//! All traits are object safe and every implementation must be `Send + Sync`: handles are
//! shared between concurrent callers as `Arc<dyn ...>`.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{backend::StoreConnector, config::{ConnectionConfig, ConnectOptions}};
//!
//! let client = connector
//!     .open_client(&ConnectionConfig::new("mongodb://localhost:27017", "app"), &ConnectOptions::default())
//!     .await?;
//! let users = client.database("app").collection("users");
//! let count = users.count(doc! {}, CountOptions::default()).await?;
//! client.close().await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use std::{any::Any, fmt::Debug, sync::Arc};

use crate::{
    config::{ConnectOptions, ConnectionConfig},
    error::StoreResult,
    options::{
        AggregateOptions, CountOptions, DeleteOptions, FindAndModifyOptions, FindOptions, IndexSpec,
        UpdateOptions,
    },
};

/// Factory for store clients.
#[async_trait]
pub trait StoreConnector: Send + Sync + Debug {
    /// Opens a new client session against `config.uri`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Initialization`](crate::error::StoreError::Initialization) if
    /// the address cannot be parsed or the client cannot be created.
    async fn open_client(
        &self,
        config: &ConnectionConfig,
        options: &ConnectOptions,
    ) -> StoreResult<Arc<dyn StoreClient>>;
}

/// A client session owning the connection to the store.
#[async_trait]
pub trait StoreClient: Send + Sync + Debug {
    /// Selects a database by name.
    fn database(&self, name: &str) -> Arc<dyn StoreDatabase>;

    /// Closes the session. Operations issued through the client afterwards fail.
    async fn close(&self) -> StoreResult<()>;
}

/// A selected database.
pub trait StoreDatabase: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn collection(&self, name: &str) -> Arc<dyn StoreCollection>;
}

/// Outcome of an update or replace.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

impl UpdateOutcome {
    /// Number of documents the write actually touched: modified plus upserted.
    pub fn affected(&self) -> u64 {
        self.modified + u64::from(self.upserted_id.is_some())
    }
}

/// Collection-level operations of a document store.
///
/// Inserted documents without an `_id` receive a store-generated `ObjectId`; the
/// insert operations return the documents as stored, identity included.
#[async_trait]
pub trait StoreCollection: Send + Sync + Debug {
    fn name(&self) -> &str;

    /// Returns the collection as `Any`, to reach the driver type behind the trait.
    fn as_any(&self) -> &dyn Any;

    async fn insert_one(&self, document: Document) -> StoreResult<Document>;

    async fn insert_many(&self, documents: Vec<Document>) -> StoreResult<Vec<Document>>;

    async fn find(&self, filter: Document, options: FindOptions) -> StoreResult<Vec<Document>>;

    /// Like `find`, returning the first match. `options.limit` is ignored.
    async fn find_one(&self, filter: Document, options: FindOptions) -> StoreResult<Option<Document>>;

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>>;

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome>;

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome>;

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome>;

    /// Returns the number of deleted documents.
    async fn delete_one(&self, filter: Document, options: DeleteOptions) -> StoreResult<u64>;

    /// Returns the number of deleted documents.
    async fn delete_many(&self, filter: Document, options: DeleteOptions) -> StoreResult<u64>;

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> StoreResult<Vec<Document>>;

    async fn distinct(&self, field: &str, filter: Document) -> StoreResult<Vec<Bson>>;

    async fn count(&self, filter: Document, options: CountOptions) -> StoreResult<u64>;

    /// Returns the names of the created indexes.
    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> StoreResult<Vec<String>>;

    async fn list_index_names(&self) -> StoreResult<Vec<String>>;
}

impl dyn StoreCollection {
    /// Attempts to downcast to the concrete driver collection.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let collection = User::on(&registry)?.collection();
    /// if let Some(mongo) = collection.downcast_ref::<MongoCollection>() {
    ///     mongo.inner().drop().await?;
    /// }
    /// ```
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    #[test]
    fn test_update_outcome_affected() {
        let modified = UpdateOutcome { matched: 3, modified: 2, upserted_id: None };
        let upserted = UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted_id: Some(Bson::ObjectId(ObjectId::new())),
        };

        assert_eq!(modified.affected(), 2);
        assert_eq!(upserted.affected(), 1);
        assert_eq!(UpdateOutcome::default().affected(), 0);
    }
}
