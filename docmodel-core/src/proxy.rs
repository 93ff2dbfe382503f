//! The query proxy: model operations bound to one connection.
//!
//! A [`ModelProxy`] resolves the model's collection on its handle, merges caller options
//! onto the operation defaults, calls the store and normalizes what comes back. Obtain
//! one through [`ModelExt::on`](crate::model::ModelExt::on) or
//! [`ConnectionRegistry::with`](crate::registry::ConnectionRegistry::with).
//!
//! | Operation | Returns |
//! |---|---|
//! | `insert_one`, `insert_many` | instances as stored |
//! | `find` | instances |
//! | `find_one`, `find_by_id`, `find_*_and_*` | `Option` of an instance |
//! | `update_*`, `replace_one`, `delete_*`, `count` | a count |
//! | `aggregate`, `distinct` | raw values |
//! | `paged_find` | a [`PageResult`] |

use bson::{Bson, Document, doc, oid::ObjectId};
use std::{fmt, marker::PhantomData, sync::Arc};
use tracing::debug;

use crate::{
    backend::StoreCollection,
    error::{ModelError, ModelResult},
    identity::IntoObjectId,
    model::{ID_FIELD, Model, ModelExt, with_identity},
    normalize,
    options::{
        AggregateOptions, CountOptions, DeleteOptions, FindAndModifyOptions, FindOptions, IndexSpec,
        MergeOptions, ReturnDocument, UpdateOptions,
    },
    page::{PageResult, check_paging, skip_for},
    registry::Handle,
};

/// Model operations for `M` on one connection.
pub struct ModelProxy<M> {
    handle: Handle,
    collection: Arc<dyn StoreCollection>,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelProxy<M> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            collection: Arc::clone(&self.collection),
            _model: PhantomData,
        }
    }
}

impl<M> fmt::Debug for ModelProxy<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelProxy")
            .field("connection", &self.handle.name())
            .field("collection", &self.collection.name())
            .finish()
    }
}

fn by_id(id: ObjectId) -> Document {
    doc! { "_id": id }
}

fn find_and_modify_defaults() -> FindAndModifyOptions {
    FindAndModifyOptions::returning(ReturnDocument::After)
}

impl<M: Model> ModelProxy<M> {
    /// Binds `M` to `handle`, resolving the model's collection on its database.
    pub fn new(handle: Handle) -> Self {
        let collection = handle.database().collection(M::collection_name());

        Self {
            handle,
            collection,
            _model: PhantomData,
        }
    }

    /// The handle this proxy is bound to.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// The raw store collection, for operations the proxy does not cover.
    pub fn collection(&self) -> Arc<dyn StoreCollection> {
        Arc::clone(&self.collection)
    }

    fn trace(&self, op: &'static str) {
        debug!(
            connection = self.handle.name(),
            collection = self.collection.name(),
            op,
            "model operation"
        );
    }

    /// Inserts one document and returns it as stored.
    ///
    /// The document is validated against the model schema before it reaches the store.
    /// A missing `_id` is generated by the store.
    ///
    /// # Arguments
    ///
    /// * `document` - The document to insert, with or without an `_id`
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] if the schema rejects the document, or
    /// [`ModelError::Store`] if the insert fails (for example on a duplicate `_id`).
    pub async fn insert_one(&self, document: Document) -> ModelResult<M> {
        self.trace("insert_one");

        let document = Self::checked(document)?;
        let stored = self.collection.insert_one(document).await?;

        normalize::one(stored)
    }

    /// Inserts documents in order and returns them as stored.
    ///
    /// Every document is validated before any of them is written.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] if the schema rejects any document, or
    /// [`ModelError::Store`] if the insert fails.
    pub async fn insert_many(&self, documents: Vec<Document>) -> ModelResult<Vec<M>> {
        self.trace("insert_many");

        let documents = documents
            .into_iter()
            .map(Self::checked)
            .collect::<ModelResult<Vec<_>>>()?;
        let stored = self.collection.insert_many(documents).await?;

        normalize::many(stored)
    }

    /// Finds every document matching `filter`.
    ///
    /// # Arguments
    ///
    /// * `filter` - Query filter; an empty document matches everything
    /// * `options` - Sort, projection, limit, skip and time limit
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the query fails, or [`ModelError::Validation`]
    /// if a returned document does not fit the model.
    pub async fn find(&self, filter: Document, options: FindOptions) -> ModelResult<Vec<M>> {
        self.trace("find");

        let found = self.collection.find(filter, options).await?;

        normalize::many(found)
    }

    /// Finds the first document matching `filter`, honouring the sort in `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the query fails, or [`ModelError::Validation`]
    /// if the returned document does not fit the model.
    pub async fn find_one(&self, filter: Document, options: FindOptions) -> ModelResult<Option<M>> {
        self.trace("find_one");

        let found = self.collection.find_one(filter, options).await?;

        normalize::optional(found)
    }

    /// Finds the document with the given identity.
    ///
    /// # Arguments
    ///
    /// * `id` - An [`ObjectId`] or its 24 character hex form
    /// * `options` - Projection and time limit
    ///
    /// # Errors
    ///
    /// A malformed identifier fails with [`ModelError::IdentityCast`] before the store
    /// is called.
    pub async fn find_by_id(&self, id: impl IntoObjectId, options: FindOptions) -> ModelResult<Option<M>> {
        let id = id.into_object_id()?;
        self.trace("find_by_id");

        let found = self.collection.find_one(by_id(id), options).await?;

        normalize::optional(found)
    }

    /// Updates the document with the given identity and returns it, by default after
    /// the update.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::IdentityCast`] for a malformed identifier (the store is not
    /// called), or [`ModelError::Store`] if the update fails.
    pub async fn find_by_id_and_update(
        &self,
        id: impl IntoObjectId,
        update: Document,
        options: FindAndModifyOptions,
    ) -> ModelResult<Option<M>> {
        let id = id.into_object_id()?;
        self.trace("find_by_id_and_update");

        let options = options.merge_onto(find_and_modify_defaults());
        let modified = self
            .collection
            .find_one_and_update(by_id(id), update, options)
            .await?;

        normalize::optional(modified)
    }

    /// Deletes the document with the given identity and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::IdentityCast`] for a malformed identifier (the store is not
    /// called), or [`ModelError::Store`] if the delete fails.
    pub async fn find_by_id_and_delete(
        &self,
        id: impl IntoObjectId,
        options: FindAndModifyOptions,
    ) -> ModelResult<Option<M>> {
        let id = id.into_object_id()?;
        self.trace("find_by_id_and_delete");

        let removed = self
            .collection
            .find_one_and_delete(by_id(id), options)
            .await?;

        normalize::optional(removed)
    }

    /// Applies `update` to the first match and returns it, by default after the update.
    ///
    /// # Arguments
    ///
    /// * `filter` - Selects the document to update
    /// * `update` - Update operators such as `$set` or `$inc`
    /// * `options` - Merged onto a default of [`ReturnDocument::After`]
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the update fails.
    pub async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> ModelResult<Option<M>> {
        self.trace("find_one_and_update");

        let options = options.merge_onto(find_and_modify_defaults());
        let modified = self
            .collection
            .find_one_and_update(filter, update, options)
            .await?;

        normalize::optional(modified)
    }

    /// Replaces the first match and returns it, by default after the replacement.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] if the schema rejects the replacement, or
    /// [`ModelError::Store`] if the replacement fails.
    pub async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> ModelResult<Option<M>> {
        self.trace("find_one_and_replace");

        let replacement = Self::checked(replacement)?;
        let options = options.merge_onto(find_and_modify_defaults());
        let modified = self
            .collection
            .find_one_and_replace(filter, replacement, options)
            .await?;

        normalize::optional(modified)
    }

    /// Deletes the first match and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the delete fails.
    pub async fn find_one_and_delete(
        &self,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> ModelResult<Option<M>> {
        self.trace("find_one_and_delete");

        let removed = self
            .collection
            .find_one_and_delete(filter, options)
            .await?;

        normalize::optional(removed)
    }

    /// Updates the first document matching `filter`. Returns the number of documents
    /// modified or upserted.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the update fails.
    pub async fn update_one(&self, filter: Document, update: Document, options: UpdateOptions) -> ModelResult<u64> {
        self.trace("update_one");

        let outcome = self
            .collection
            .update_one(filter, update, options.merge_onto(UpdateOptions::default()))
            .await?;

        Ok(outcome.affected())
    }

    /// Updates every document matching `filter`. Returns the number of documents
    /// modified or upserted.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the update fails.
    pub async fn update_many(&self, filter: Document, update: Document, options: UpdateOptions) -> ModelResult<u64> {
        self.trace("update_many");

        let outcome = self
            .collection
            .update_many(filter, update, options.merge_onto(UpdateOptions::default()))
            .await?;

        Ok(outcome.affected())
    }

    /// Replaces the first document matching `filter`. Returns the number of documents
    /// replaced or upserted.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Validation`] if the schema rejects the replacement, or
    /// [`ModelError::Store`] if the replacement fails.
    pub async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> ModelResult<u64> {
        self.trace("replace_one");

        let replacement = Self::checked(replacement)?;
        let outcome = self
            .collection
            .replace_one(filter, replacement, options.merge_onto(UpdateOptions::default()))
            .await?;

        Ok(outcome.affected())
    }

    /// Deletes the first document matching `filter`. Returns the number of deleted
    /// documents.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the delete fails.
    pub async fn delete_one(&self, filter: Document, options: DeleteOptions) -> ModelResult<u64> {
        self.trace("delete_one");

        Ok(self
            .collection
            .delete_one(filter, options.merge_onto(DeleteOptions::default()))
            .await?)
    }

    /// Deletes every document matching `filter`. Returns the number of deleted documents.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the delete fails.
    pub async fn delete_many(&self, filter: Document, options: DeleteOptions) -> ModelResult<u64> {
        self.trace("delete_many");

        Ok(self
            .collection
            .delete_many(filter, options.merge_onto(DeleteOptions::default()))
            .await?)
    }

    /// Runs an aggregation pipeline. Output documents are returned raw; pipelines
    /// usually reshape documents away from the model.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if a stage is malformed or the pipeline fails.
    pub async fn aggregate(&self, pipeline: Vec<Document>, options: AggregateOptions) -> ModelResult<Vec<Document>> {
        self.trace("aggregate");

        Ok(self.collection.aggregate(pipeline, options).await?)
    }

    /// Distinct values of `field` across the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the query fails.
    pub async fn distinct(&self, field: &str, filter: Document) -> ModelResult<Vec<Bson>> {
        self.trace("distinct");

        Ok(self.collection.distinct(field, filter).await?)
    }

    /// Counts the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the count fails.
    pub async fn count(&self, filter: Document, options: CountOptions) -> ModelResult<u64> {
        self.trace("count");

        Ok(self.collection.count(filter, options).await?)
    }

    /// Creates `indexes` and returns their names.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if an index cannot be created.
    pub async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> ModelResult<Vec<String>> {
        self.trace("create_indexes");

        Ok(self.collection.create_indexes(indexes).await?)
    }

    /// Creates the indexes declared by [`Model::indexes`]. Does nothing when none are
    /// declared.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if an index cannot be created.
    pub async fn ensure_indexes(&self) -> ModelResult<Vec<String>> {
        let indexes = M::indexes();
        if indexes.is_empty() {
            return Ok(Vec::new());
        }

        self.create_indexes(indexes).await
    }

    /// Names of the indexes on the model's collection.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the listing fails.
    pub async fn list_index_names(&self) -> ModelResult<Vec<String>> {
        self.trace("list_index_names");

        Ok(self.collection.list_index_names().await?)
    }

    /// Finds one page of matches plus paging metadata.
    ///
    /// The count and the page query run concurrently. Sort and projection come from
    /// `options`; its `limit` and `skip` are replaced by the page window.
    ///
    /// # Arguments
    ///
    /// * `filter` - Query filter for both the count and the page
    /// * `page` - 1-based page number
    /// * `limit` - Page size
    /// * `options` - Sort and projection for the page query
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidPaging`] if `page` or `limit` is zero, and
    /// [`ModelError::PagingAborted`] if either query fails.
    pub async fn paged_find(
        &self,
        filter: Document,
        page: u64,
        limit: u64,
        options: FindOptions,
    ) -> ModelResult<PageResult<M>> {
        check_paging(page, limit)?;
        self.trace("paged_find");

        let window = FindOptions {
            limit: Some(i64::try_from(limit).unwrap_or(i64::MAX)),
            skip: Some(skip_for(page, limit)),
            ..FindOptions::default()
        };
        let options = window.merge_onto(options);

        let (total, data) = futures::try_join!(
            self.count(filter.clone(), CountOptions::default()),
            self.find(filter, options),
        )
        .map_err(|e| ModelError::PagingAborted(Box::new(e)))?;

        Ok(PageResult::builder(data)
            .with_page(page)
            .with_limit(limit)
            .with_total(total)
            .build())
    }

    fn checked(mut document: Document) -> ModelResult<Document> {
        let id = document.remove(ID_FIELD);

        Ok(with_identity(id, M::validate_document(document)?))
    }
}
