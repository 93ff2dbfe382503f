use std::{any::Any, sync::Arc};
use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Bson, Document, oid::ObjectId};
use mongodb::{
    Client, Collection, Database, IndexModel,
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{self as driver, ClientOptions, IndexOptions},
};
use tracing::debug;

use docmodel_core::{
    backend::{StoreClient, StoreCollection, StoreConnector, StoreDatabase, UpdateOutcome},
    config::{ConnectOptions, ConnectionConfig},
    error::{StoreError, StoreResult},
    options::{
        AggregateOptions, CountOptions, DeleteOptions, FindAndModifyOptions, FindOptions, IndexSpec,
        ReturnDocument, UpdateOptions,
    },
};

const DUPLICATE_KEY_CODE: i32 = 11000;

/// Opens [`MongoClient`]s.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn apply_connect_options(client_options: &mut ClientOptions, options: &ConnectOptions) {
    if let Some(app_name) = &options.app_name {
        client_options.app_name = Some(app_name.clone());
    }
    if let Some(max_pool_size) = options.max_pool_size {
        client_options.max_pool_size = Some(max_pool_size);
    }
    if let Some(min_pool_size) = options.min_pool_size {
        client_options.min_pool_size = Some(min_pool_size);
    }
    if let Some(connect_timeout) = options.connect_timeout {
        client_options.connect_timeout = Some(connect_timeout);
    }
    if let Some(server_selection_timeout) = options.server_selection_timeout {
        client_options.server_selection_timeout = Some(server_selection_timeout);
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn open_client(
        &self,
        config: &ConnectionConfig,
        options: &ConnectOptions,
    ) -> StoreResult<Arc<dyn StoreClient>> {
        let mut client_options = ClientOptions::parse(&config.uri)
            .await
            .map_err(|e| StoreError::Initialization(e.to_string()))?;
        apply_connect_options(&mut client_options, options);

        let client = Client::with_options(client_options)
            .map_err(|e| StoreError::Initialization(e.to_string()))?;

        debug!(database = %config.database, "opened mongodb client");

        Ok(Arc::new(MongoClient::new(client)))
    }
}

/// A driver client.
#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl StoreClient for MongoClient {
    fn database(&self, name: &str) -> Arc<dyn StoreDatabase> {
        Arc::new(MongoDatabase {
            database: self.client.database(name),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

/// A driver database.
#[derive(Debug, Clone)]
pub struct MongoDatabase {
    database: Database,
}

impl MongoDatabase {
    pub fn inner(&self) -> &Database {
        &self.database
    }
}

impl StoreDatabase for MongoDatabase {
    fn name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Arc<dyn StoreCollection> {
        Arc::new(MongoCollection {
            collection: self.database.collection::<Document>(name),
        })
    }
}

/// A driver collection of raw documents.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    collection: Collection<Document>,
}

impl MongoCollection {
    /// The driver collection, for operations outside [`StoreCollection`].
    pub fn inner(&self) -> &Collection<Document> {
        &self.collection
    }

    fn map_error(&self, error: MongoError) -> StoreError {
        if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = error.kind.as_ref() {
            if write_error.code == DUPLICATE_KEY_CODE {
                return StoreError::DuplicateKey(write_error.message.clone(), self.collection.name().to_string());
            }
        }

        StoreError::Backend(error.to_string())
    }
}

/// Puts a fresh `ObjectId` in front of a document that has no `_id`, so inserts can
/// return the stored document.
fn with_generated_id(document: Document) -> Document {
    if document.contains_key("_id") {
        return document;
    }

    let mut identified = Document::new();
    identified.insert("_id", ObjectId::new());
    for (key, value) in document {
        identified.insert(key, value);
    }

    identified
}

fn return_document(value: Option<ReturnDocument>) -> Option<driver::ReturnDocument> {
    value.map(|value| match value {
        ReturnDocument::Before => driver::ReturnDocument::Before,
        ReturnDocument::After => driver::ReturnDocument::After,
    })
}

pub(crate) fn find_options(options: FindOptions) -> driver::FindOptions {
    let mut mapped = driver::FindOptions::default();
    mapped.sort = options.sort;
    mapped.projection = options.projection;
    mapped.limit = options.limit;
    mapped.skip = options.skip;
    mapped.max_time = options.max_time;
    mapped
}

fn find_one_options(options: FindOptions) -> driver::FindOneOptions {
    let mut mapped = driver::FindOneOptions::default();
    mapped.sort = options.sort;
    mapped.projection = options.projection;
    mapped.skip = options.skip;
    mapped.max_time = options.max_time;
    mapped
}

pub(crate) fn find_one_and_update_options(options: FindAndModifyOptions) -> driver::FindOneAndUpdateOptions {
    let mut mapped = driver::FindOneAndUpdateOptions::default();
    mapped.sort = options.sort;
    mapped.projection = options.projection;
    mapped.upsert = options.upsert;
    mapped.return_document = return_document(options.return_document);
    mapped.max_time = options.max_time;
    mapped
}

fn find_one_and_replace_options(options: FindAndModifyOptions) -> driver::FindOneAndReplaceOptions {
    let mut mapped = driver::FindOneAndReplaceOptions::default();
    mapped.sort = options.sort;
    mapped.projection = options.projection;
    mapped.upsert = options.upsert;
    mapped.return_document = return_document(options.return_document);
    mapped.max_time = options.max_time;
    mapped
}

fn find_one_and_delete_options(options: FindAndModifyOptions) -> driver::FindOneAndDeleteOptions {
    let mut mapped = driver::FindOneAndDeleteOptions::default();
    mapped.sort = options.sort;
    mapped.projection = options.projection;
    mapped.max_time = options.max_time;
    mapped
}

fn update_options(options: UpdateOptions) -> driver::UpdateOptions {
    let mut mapped = driver::UpdateOptions::default();
    mapped.upsert = options.upsert;
    mapped.comment = options.comment;
    mapped
}

fn replace_options(options: UpdateOptions) -> driver::ReplaceOptions {
    let mut mapped = driver::ReplaceOptions::default();
    mapped.upsert = options.upsert;
    mapped.comment = options.comment;
    mapped
}

fn delete_options(options: DeleteOptions) -> driver::DeleteOptions {
    let mut mapped = driver::DeleteOptions::default();
    mapped.comment = options.comment;
    mapped
}

pub(crate) fn count_options(options: CountOptions) -> driver::CountOptions {
    let mut mapped = driver::CountOptions::default();
    mapped.limit = options.limit;
    mapped.skip = options.skip;
    mapped.max_time = options.max_time;
    mapped
}

fn aggregate_options(options: AggregateOptions) -> driver::AggregateOptions {
    let mut mapped = driver::AggregateOptions::default();
    mapped.allow_disk_use = options.allow_disk_use;
    mapped.batch_size = options.batch_size;
    mapped.max_time = options.max_time;
    mapped
}

pub(crate) fn index_model(index: IndexSpec) -> IndexModel {
    let mut options = IndexOptions::default();
    options.name = index.name;
    options.unique = index.unique;

    IndexModel::builder()
        .keys(index.keys)
        .options(options)
        .build()
}

fn update_outcome(result: mongodb::results::UpdateResult) -> UpdateOutcome {
    UpdateOutcome {
        matched: result.matched_count,
        modified: result.modified_count,
        upserted_id: result.upserted_id,
    }
}

#[async_trait]
impl StoreCollection for MongoCollection {
    fn name(&self) -> &str {
        self.collection.name()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    async fn insert_one(&self, document: Document) -> StoreResult<Document> {
        let document = with_generated_id(document);

        self.collection
            .insert_one(&document)
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(document)
    }

    async fn insert_many(&self, documents: Vec<Document>) -> StoreResult<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let documents = documents
            .into_iter()
            .map(with_generated_id)
            .collect::<Vec<_>>();

        self.collection
            .insert_many(&documents)
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(documents)
    }

    async fn find(&self, filter: Document, options: FindOptions) -> StoreResult<Vec<Document>> {
        self.collection
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(|e| self.map_error(e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn find_one(&self, filter: Document, options: FindOptions) -> StoreResult<Option<Document>> {
        self.collection
            .find_one(filter)
            .with_options(find_one_options(options))
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.collection
            .find_one_and_update(filter, update)
            .with_options(find_one_and_update_options(options))
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.collection
            .find_one_and_replace(filter, replacement)
            .with_options(find_one_and_replace_options(options))
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.collection
            .find_one_and_delete(filter)
            .with_options(find_one_and_delete_options(options))
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.collection
            .update_one(filter, update)
            .with_options(update_options(options))
            .await
            .map(update_outcome)
            .map_err(|e| self.map_error(e))
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.collection
            .update_many(filter, update)
            .with_options(update_options(options))
            .await
            .map(update_outcome)
            .map_err(|e| self.map_error(e))
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.collection
            .replace_one(filter, replacement)
            .with_options(replace_options(options))
            .await
            .map(update_outcome)
            .map_err(|e| self.map_error(e))
    }

    async fn delete_one(&self, filter: Document, options: DeleteOptions) -> StoreResult<u64> {
        self.collection
            .delete_one(filter)
            .with_options(delete_options(options))
            .await
            .map(|result| result.deleted_count)
            .map_err(|e| self.map_error(e))
    }

    async fn delete_many(&self, filter: Document, options: DeleteOptions) -> StoreResult<u64> {
        self.collection
            .delete_many(filter)
            .with_options(delete_options(options))
            .await
            .map(|result| result.deleted_count)
            .map_err(|e| self.map_error(e))
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> StoreResult<Vec<Document>> {
        self.collection
            .aggregate(pipeline)
            .with_options(aggregate_options(options))
            .await
            .map_err(|e| self.map_error(e))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn distinct(&self, field: &str, filter: Document) -> StoreResult<Vec<Bson>> {
        self.collection
            .distinct(field, filter)
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn count(&self, filter: Document, options: CountOptions) -> StoreResult<u64> {
        self.collection
            .count_documents(filter)
            .with_options(count_options(options))
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> StoreResult<Vec<String>> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }

        self.collection
            .create_indexes(indexes.into_iter().map(index_model))
            .await
            .map(|result| result.index_names)
            .map_err(|e| self.map_error(e))
    }

    async fn list_index_names(&self) -> StoreResult<Vec<String>> {
        self.collection
            .list_index_names()
            .await
            .map_err(|e| self.map_error(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use std::time::Duration;

    #[test]
    fn test_find_options_are_carried_over() {
        let mapped = find_options(
            FindOptions::builder()
                .with_sort("-age")
                .with_projection("name")
                .with_limit(10)
                .with_skip(20)
                .with_max_time(Duration::from_secs(2))
                .build(),
        );

        assert_eq!(mapped.sort, Some(doc! { "age": -1 }));
        assert_eq!(mapped.projection, Some(doc! { "name": true }));
        assert_eq!(mapped.limit, Some(10));
        assert_eq!(mapped.skip, Some(20));
        assert_eq!(mapped.max_time, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_return_document_is_mapped() {
        let mapped = find_one_and_update_options(FindAndModifyOptions::returning(ReturnDocument::After));

        assert!(matches!(mapped.return_document, Some(driver::ReturnDocument::After)));
        assert_eq!(mapped.upsert, None);
    }

    #[test]
    fn test_count_options_are_carried_over() {
        let mapped = count_options(CountOptions {
            limit: Some(5),
            skip: Some(1),
            max_time: None,
        });

        assert_eq!(mapped.limit, Some(5));
        assert_eq!(mapped.skip, Some(1));
    }

    #[test]
    fn test_index_model_keeps_name_and_uniqueness() {
        let model = index_model(IndexSpec::new("email").with_name("by_email").with_unique(true));

        assert_eq!(model.keys, doc! { "email": 1 });
        let options = model.options.unwrap_or_default();
        assert_eq!(options.name.as_deref(), Some("by_email"));
        assert_eq!(options.unique, Some(true));
    }

    #[test]
    fn test_connect_options_override_parsed_defaults() {
        let mut client_options = ClientOptions::default();
        apply_connect_options(
            &mut client_options,
            &ConnectOptions::builder()
                .with_app_name("docmodel-tests")
                .with_max_pool_size(4)
                .build(),
        );

        assert_eq!(client_options.app_name.as_deref(), Some("docmodel-tests"));
        assert_eq!(client_options.max_pool_size, Some(4));
        assert_eq!(client_options.min_pool_size, None);
    }

    #[test]
    fn test_generated_id_comes_first() {
        let document = with_generated_id(doc! { "name": "Ren" });

        assert_eq!(document.keys().next().map(String::as_str), Some("_id"));
        assert_eq!(with_generated_id(doc! { "_id": 1 }), doc! { "_id": 1 });
    }
}
