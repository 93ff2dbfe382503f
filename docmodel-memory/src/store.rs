//! In-memory implementation of the store capability traits.
//!
//! An [`InMemoryServer`] plays the part of a database server: it holds the data and
//! opens clients against it. Clients opened from the same server (or its clones) see
//! the same data. Documents are kept as BSON in insertion order, which is the natural
//! order queries return them in without a sort.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::{Bson, Document, oid::ObjectId};
use tracing::{debug, trace};

use docmodel_core::{
    backend::{StoreClient, StoreCollection, StoreConnector, StoreDatabase, UpdateOutcome},
    config::{ConnectOptions, ConnectionConfig},
    error::{StoreError, StoreResult},
    options::{
        AggregateOptions, CountOptions, DeleteOptions, FindAndModifyOptions, FindOptions, IndexSpec,
        ReturnDocument, UpdateOptions,
    },
};

use crate::{
    aggregate::run_pipeline,
    evaluator::{Comparable, compare_documents, lookup, matches, project, sort_documents},
    update::{apply_replacement, apply_update, check_replacement, check_update, upsert_seed},
};

/// Name of the index every collection has on `_id`.
pub const ID_INDEX: &str = "_id_";

#[derive(Debug, Default)]
struct CollectionState {
    documents: Vec<Document>,
    indexes: Vec<String>,
}

type CollectionMap = HashMap<String, CollectionState>;

#[derive(Debug, Default)]
struct ServerState {
    /// namespace ("database.collection") -> collection
    collections: RwLock<CollectionMap>,
    /// Operation names whose next call fails.
    failures: RwLock<Vec<String>>,
    operations: AtomicU64,
    open_clients: AtomicUsize,
}

/// Thread-safe in-memory document server.
///
/// `InMemoryServer` is cloneable; clones share the same data and counters. It
/// implements [`StoreConnector`], so it can back a
/// [`ConnectionRegistry`](docmodel_core::registry::ConnectionRegistry) directly.
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryServer;
/// use docmodel::prelude::*;
///
/// let server = InMemoryServer::new();
/// let registry = ConnectionRegistry::new(server.clone());
///
/// registry
///     .connect_default(&ConnectionConfig::new("memory://local", "app"), &ConnectOptions::default())
///     .await?;
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryServer {
    state: Arc<ServerState>,
}

impl InMemoryServer {
    /// Creates a new server with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collection operations served so far, across all clients.
    pub fn operation_count(&self) -> u64 {
        self.state.operations.load(Ordering::SeqCst)
    }

    /// Number of clients opened and not yet closed.
    pub fn open_client_count(&self) -> usize {
        self.state.open_clients.load(Ordering::SeqCst)
    }

    /// Makes the next call of the collection operation `op` (e.g. `"count"`) fail with
    /// [`StoreError::Backend`].
    pub async fn inject_failure(&self, op: impl Into<String>) {
        self.state.failures.write().await.push(op.into());
    }

    /// Snapshot of a collection's documents in natural order. Not counted as an
    /// operation.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<Document> {
        self.state
            .collections
            .read()
            .await
            .get(&namespace(database, collection))
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }

    fn client(&self) -> InMemoryClient {
        self.state.open_clients.fetch_add(1, Ordering::SeqCst);

        InMemoryClient {
            state: Arc::clone(&self.state),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

fn namespace(database: &str, collection: &str) -> String {
    format!("{database}.{collection}")
}

#[async_trait]
impl StoreConnector for InMemoryServer {
    async fn open_client(
        &self,
        config: &ConnectionConfig,
        _options: &ConnectOptions,
    ) -> StoreResult<Arc<dyn StoreClient>> {
        if !config.uri.contains("://") {
            return Err(StoreError::Initialization(format!("invalid connection string: '{}'", config.uri)));
        }
        if config.database.is_empty() {
            return Err(StoreError::Initialization("database name must not be empty".to_string()));
        }

        debug!(uri = %config.uri, "opening in-memory client");

        Ok(Arc::new(self.client()))
    }
}

/// A client session against an [`InMemoryServer`].
#[derive(Debug, Clone)]
pub struct InMemoryClient {
    state: Arc<ServerState>,
    closed: Arc<AtomicBool>,
}

impl InMemoryClient {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoreClient for InMemoryClient {
    fn database(&self, name: &str) -> Arc<dyn StoreDatabase> {
        Arc::new(InMemoryDatabase {
            name: name.to_string(),
            state: Arc::clone(&self.state),
            closed: Arc::clone(&self.closed),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.open_clients.fetch_sub(1, Ordering::SeqCst);
            debug!("closed in-memory client");
        }

        Ok(())
    }
}

/// A database selected on an [`InMemoryClient`].
#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    name: String,
    state: Arc<ServerState>,
    closed: Arc<AtomicBool>,
}

impl StoreDatabase for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn StoreCollection> {
        Arc::new(InMemoryCollection {
            name: name.to_string(),
            namespace: namespace(&self.name, name),
            state: Arc::clone(&self.state),
            closed: Arc::clone(&self.closed),
        })
    }
}

/// A collection in an [`InMemoryDatabase`].
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    name: String,
    namespace: String,
    state: Arc<ServerState>,
    closed: Arc<AtomicBool>,
}

fn id_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(id) => id.to_hex(),
        Bson::String(id) => id.clone(),
        other => other.to_string(),
    }
}

/// Puts a fresh `ObjectId` in front of a document that has no `_id`.
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

fn matching(documents: &[Document], filter: &Document) -> StoreResult<Vec<usize>> {
    let mut indices = Vec::new();

    for (index, document) in documents.iter().enumerate() {
        if matches(document, filter)? {
            indices.push(index);
        }
    }

    Ok(indices)
}

fn first_match(documents: &[Document], filter: &Document, sort: Option<&Document>) -> StoreResult<Option<usize>> {
    let mut indices = matching(documents, filter)?;

    if let Some(sort) = sort {
        indices.sort_by(|a, b| compare_documents(&documents[*a], &documents[*b], sort));
    }

    Ok(indices.into_iter().next())
}

fn projected(document: Document, projection: Option<&Document>) -> StoreResult<Document> {
    match projection {
        Some(projection) => project(&document, projection),
        None => Ok(document),
    }
}

impl InMemoryCollection {
    /// Gatekeeper for every operation: rejects closed clients, counts the call and
    /// consumes an injected failure.
    async fn begin(&self, op: &str) -> StoreResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::ClientClosed(format!("cannot run {op} on {}", self.namespace)));
        }

        self.state.operations.fetch_add(1, Ordering::SeqCst);
        trace!(namespace = %self.namespace, op, "memory store operation");

        let mut failures = self.state.failures.write().await;
        if let Some(position) = failures.iter().position(|failure| failure == op) {
            failures.remove(position);
            return Err(StoreError::Backend(format!("injected failure in {op} on {}", self.namespace)));
        }

        Ok(())
    }

    fn insert_into(&self, state: &mut CollectionState, document: Document) -> StoreResult<Document> {
        let document = with_generated_id(document);

        if let Some(id) = document.get("_id") {
            if state.documents.iter().any(|existing| existing.get("_id") == Some(id)) {
                return Err(StoreError::DuplicateKey(id_string(id), self.name.clone()));
            }
        }

        state.documents.push(document.clone());

        Ok(document)
    }

    /// Inserts the document an upsert builds from `filter` and returns it.
    fn upsert_into(
        &self,
        state: &mut CollectionState,
        filter: &Document,
        build: impl FnOnce(Document) -> StoreResult<Document>,
    ) -> StoreResult<Document> {
        let seed = upsert_seed(filter)?;
        let document = build(seed)?;

        self.insert_into(state, document)
    }

    async fn update(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
        multi: bool,
    ) -> StoreResult<UpdateOutcome> {
        check_update(&update)?;

        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        let mut indices = matching(&state.documents, &filter)?;
        if !multi {
            indices.truncate(1);
        }

        let mut outcome = UpdateOutcome {
            matched: indices.len() as u64,
            ..UpdateOutcome::default()
        };

        for index in indices {
            let mut updated = state.documents[index].clone();
            if apply_update(&mut updated, &update, false)? {
                state.documents[index] = updated;
                outcome.modified += 1;
            }
        }

        if outcome.matched == 0 && options.upsert.unwrap_or(false) {
            let inserted = self.upsert_into(state, &filter, |mut seed| {
                apply_update(&mut seed, &update, true)?;
                Ok(seed)
            })?;
            outcome.upserted_id = inserted.get("_id").cloned();
        }

        Ok(outcome)
    }

    async fn delete(&self, filter: Document, multi: bool) -> StoreResult<u64> {
        let mut collections = self.state.collections.write().await;
        let Some(state) = collections.get_mut(&self.namespace) else {
            return Ok(0);
        };

        let mut indices = matching(&state.documents, &filter)?;
        if !multi {
            indices.truncate(1);
        }

        for index in indices.iter().rev() {
            state.documents.remove(*index);
        }

        Ok(indices.len() as u64)
    }

    async fn read_documents(&self) -> Vec<Document> {
        self.state
            .collections
            .read()
            .await
            .get(&self.namespace)
            .map(|state| state.documents.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StoreCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    async fn insert_one(&self, document: Document) -> StoreResult<Document> {
        self.begin("insert_one").await?;

        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        self.insert_into(state, document)
    }

    async fn insert_many(&self, documents: Vec<Document>) -> StoreResult<Vec<Document>> {
        self.begin("insert_many").await?;

        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        documents
            .into_iter()
            .map(|document| self.insert_into(state, document))
            .collect()
    }

    async fn find(&self, filter: Document, options: FindOptions) -> StoreResult<Vec<Document>> {
        self.begin("find").await?;

        let mut found = Vec::new();
        for document in self.read_documents().await {
            if matches(&document, &filter)? {
                found.push(document);
            }
        }

        if let Some(sort) = &options.sort {
            sort_documents(&mut found, sort);
        }

        let skip = usize::try_from(options.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
        };

        found
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| projected(document, options.projection.as_ref()))
            .collect()
    }

    async fn find_one(&self, filter: Document, options: FindOptions) -> StoreResult<Option<Document>> {
        let options = FindOptions {
            limit: Some(1),
            ..options
        };

        Ok(self.find(filter, options).await?.into_iter().next())
    }

    async fn find_one_and_update(
        &self,
        filter: Document,
        update: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.begin("find_one_and_update").await?;
        check_update(&update)?;

        let return_after = options.return_document == Some(ReturnDocument::After);
        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        let result = match first_match(&state.documents, &filter, options.sort.as_ref())? {
            Some(index) => {
                let before = state.documents[index].clone();
                let mut after = before.clone();
                apply_update(&mut after, &update, false)?;
                state.documents[index] = after.clone();

                Some(if return_after { after } else { before })
            }
            None if options.upsert.unwrap_or(false) => {
                let inserted = self.upsert_into(state, &filter, |mut seed| {
                    apply_update(&mut seed, &update, true)?;
                    Ok(seed)
                })?;

                return_after.then_some(inserted)
            }
            None => None,
        };

        result
            .map(|document| projected(document, options.projection.as_ref()))
            .transpose()
    }

    async fn find_one_and_replace(
        &self,
        filter: Document,
        replacement: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.begin("find_one_and_replace").await?;
        check_replacement(&replacement)?;

        let return_after = options.return_document == Some(ReturnDocument::After);
        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        let result = match first_match(&state.documents, &filter, options.sort.as_ref())? {
            Some(index) => {
                let before = state.documents[index].clone();
                let mut after = before.clone();
                apply_replacement(&mut after, &replacement)?;
                state.documents[index] = after.clone();

                Some(if return_after { after } else { before })
            }
            None if options.upsert.unwrap_or(false) => {
                let inserted = self.upsert_into(state, &filter, |seed| {
                    let mut document = Document::new();
                    if let Some(id) = seed.get("_id").or(replacement.get("_id")) {
                        document.insert("_id", id.clone());
                    }
                    apply_replacement(&mut document, &replacement)?;
                    Ok(document)
                })?;

                return_after.then_some(inserted)
            }
            None => None,
        };

        result
            .map(|document| projected(document, options.projection.as_ref()))
            .transpose()
    }

    async fn find_one_and_delete(
        &self,
        filter: Document,
        options: FindAndModifyOptions,
    ) -> StoreResult<Option<Document>> {
        self.begin("find_one_and_delete").await?;

        let mut collections = self.state.collections.write().await;
        let Some(state) = collections.get_mut(&self.namespace) else {
            return Ok(None);
        };

        match first_match(&state.documents, &filter, options.sort.as_ref())? {
            Some(index) => {
                let removed = state.documents.remove(index);
                projected(removed, options.projection.as_ref()).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.begin("update_one").await?;
        self.update(filter, update, options, false).await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.begin("update_many").await?;
        self.update(filter, update, options, true).await
    }

    async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: UpdateOptions,
    ) -> StoreResult<UpdateOutcome> {
        self.begin("replace_one").await?;
        check_replacement(&replacement)?;

        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        match first_match(&state.documents, &filter, None)? {
            Some(index) => {
                let mut replaced = state.documents[index].clone();
                let changed = apply_replacement(&mut replaced, &replacement)?;
                state.documents[index] = replaced;

                Ok(UpdateOutcome {
                    matched: 1,
                    modified: u64::from(changed),
                    upserted_id: None,
                })
            }
            None if options.upsert.unwrap_or(false) => {
                let inserted = self.upsert_into(state, &filter, |seed| {
                    let mut document = Document::new();
                    if let Some(id) = seed.get("_id").or(replacement.get("_id")) {
                        document.insert("_id", id.clone());
                    }
                    apply_replacement(&mut document, &replacement)?;
                    Ok(document)
                })?;

                Ok(UpdateOutcome {
                    upserted_id: inserted.get("_id").cloned(),
                    ..UpdateOutcome::default()
                })
            }
            None => Ok(UpdateOutcome::default()),
        }
    }

    async fn delete_one(&self, filter: Document, _options: DeleteOptions) -> StoreResult<u64> {
        self.begin("delete_one").await?;
        self.delete(filter, false).await
    }

    async fn delete_many(&self, filter: Document, _options: DeleteOptions) -> StoreResult<u64> {
        self.begin("delete_many").await?;
        self.delete(filter, true).await
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> StoreResult<Vec<Document>> {
        self.begin("aggregate").await?;

        run_pipeline(self.read_documents().await, &pipeline)
    }

    async fn distinct(&self, field: &str, filter: Document) -> StoreResult<Vec<Bson>> {
        self.begin("distinct").await?;

        let mut values: Vec<Bson> = Vec::new();
        for document in self.read_documents().await {
            if !matches(&document, &filter)? {
                continue;
            }

            for value in lookup(&document, field) {
                let candidates = match value {
                    Bson::Array(items) => items.iter().collect::<Vec<_>>(),
                    single => vec![single],
                };

                for candidate in candidates {
                    let seen = values
                        .iter()
                        .any(|existing| Comparable::from(existing) == Comparable::from(candidate));
                    if !seen {
                        values.push(candidate.clone());
                    }
                }
            }
        }

        Ok(values)
    }

    async fn count(&self, filter: Document, options: CountOptions) -> StoreResult<u64> {
        self.begin("count").await?;

        let documents = self.read_documents().await;
        let total = matching(&documents, &filter)?.len() as u64;
        let remaining = total.saturating_sub(options.skip.unwrap_or(0));

        Ok(match options.limit {
            Some(limit) if limit > 0 => remaining.min(limit),
            _ => remaining,
        })
    }

    async fn create_indexes(&self, indexes: Vec<IndexSpec>) -> StoreResult<Vec<String>> {
        self.begin("create_indexes").await?;

        let mut collections = self.state.collections.write().await;
        let state = collections.entry(self.namespace.clone()).or_default();

        let mut names = Vec::with_capacity(indexes.len());
        for index in indexes {
            if index.keys.is_empty() {
                return Err(StoreError::InvalidOperation("index keys must not be empty".to_string()));
            }

            let name = index.resolved_name();
            if !state.indexes.contains(&name) {
                state.indexes.push(name.clone());
            }
            names.push(name);
        }

        Ok(names)
    }

    async fn list_index_names(&self) -> StoreResult<Vec<String>> {
        self.begin("list_index_names").await?;

        Ok(self
            .state
            .collections
            .read()
            .await
            .get(&self.namespace)
            .map(|state| {
                std::iter::once(ID_INDEX.to_string())
                    .chain(state.indexes.iter().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}
