//! Named connections and their lifecycle.
//!
//! A [`ConnectionRegistry`] owns every open client, keyed by name. Create one at process
//! start, pass it by reference to whatever issues model operations, and call
//! [`ConnectionRegistry::shutdown`] at teardown.
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryServer};
//!
//! let registry = ConnectionRegistry::new(InMemoryServer::new());
//! registry.connect_default(&ConnectionConfig::from_env()?, &ConnectOptions::default()).await?;
//! registry.connect(&archive_config, &ConnectOptions::default(), "archive").await?;
//!
//! let recent = Order::on(&registry)?.find(doc! {}, FindOptions::default()).await?;
//! let old = Order::with(&registry, "archive")?.find(doc! {}, FindOptions::default()).await?;
//!
//! registry.shutdown().await?;
//! ```
//!
//! Client I/O (open and close) never happens while the table lock is held; the lock only
//! guards swapping entries in and out, so lookups see either the state before or after a
//! mutation.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::Arc,
};
use tracing::{info, warn};

use crate::{
    backend::{StoreClient, StoreConnector, StoreDatabase},
    config::{ConnectOptions, ConnectionConfig},
    error::{ModelError, ModelResult},
    model::Model,
    proxy::ModelProxy,
};

/// Name used when no connection name is given.
pub const DEFAULT_CONNECTION: &str = "default";

/// A live database plus the client session owning it.
///
/// Cloning is cheap; clones refer to the same client and database.
#[derive(Clone)]
pub struct Handle {
    name: Arc<str>,
    client: Arc<dyn StoreClient>,
    database: Arc<dyn StoreDatabase>,
    connected_at: DateTime<Utc>,
}

impl Handle {
    pub fn new(name: &str, client: Arc<dyn StoreClient>, database: Arc<dyn StoreDatabase>) -> Self {
        Self {
            name: Arc::from(name),
            client,
            database,
            connected_at: Utc::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn database(&self) -> &Arc<dyn StoreDatabase> {
        &self.database
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Whether both handles share the same client and database.
    pub fn same_as(&self, other: &Handle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.client), Arc::as_ptr(&other.client))
            && std::ptr::addr_eq(Arc::as_ptr(&self.database), Arc::as_ptr(&other.database))
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("name", &self.name)
            .field("database", &self.database.name())
            .field("connected_at", &self.connected_at)
            .finish()
    }
}

/// Anything a model operation can take its connection from.
pub trait ConnectionSource {
    fn resolve_handle(&self) -> ModelResult<Handle>;
}

impl ConnectionSource for ConnectionRegistry {
    fn resolve_handle(&self) -> ModelResult<Handle> {
        self.resolve(None)
    }
}

impl ConnectionSource for Handle {
    fn resolve_handle(&self) -> ModelResult<Handle> {
        Ok(self.clone())
    }
}

impl<T: ConnectionSource + ?Sized> ConnectionSource for Arc<T> {
    fn resolve_handle(&self) -> ModelResult<Handle> {
        (**self).resolve_handle()
    }
}

type BoundSets = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

struct Entry {
    handle: Handle,
    bound: Mutex<BoundSets>,
}

/// Table of named connections.
pub struct ConnectionRegistry {
    connector: Arc<dyn StoreConnector>,
    entries: RwLock<HashMap<String, Entry>>,
}

impl ConnectionRegistry {
    pub fn new(connector: impl StoreConnector + 'static) -> Self {
        Self::from_arc(Arc::new(connector))
    }

    pub fn from_arc(connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            connector,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Opens a client and registers it under `name`.
    ///
    /// An existing handle with the same name is replaced and its client closed; proxies
    /// memoized for it are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Store`] if the client cannot be opened. Nothing is
    /// registered in that case.
    pub async fn connect(
        &self,
        config: &ConnectionConfig,
        options: &ConnectOptions,
        name: &str,
    ) -> ModelResult<Handle> {
        let client = self
            .connector
            .open_client(config, options)
            .await?;
        let database = client.database(&config.database);
        let handle = Handle::new(name, client, database);

        let superseded = self
            .entries
            .write()
            .insert(
                name.to_string(),
                Entry {
                    handle: handle.clone(),
                    bound: Mutex::new(HashMap::new()),
                },
            );

        info!(connection = name, database = %config.database, "connected");

        if let Some(previous) = superseded {
            warn!(connection = name, "closing superseded connection");

            if let Err(e) = previous.handle.client().close().await {
                warn!(connection = name, error = %e, "failed to close superseded connection");
            }
        }

        Ok(handle)
    }

    /// [`connect`](Self::connect) under [`DEFAULT_CONNECTION`].
    pub async fn connect_default(
        &self,
        config: &ConnectionConfig,
        options: &ConnectOptions,
    ) -> ModelResult<Handle> {
        self.connect(config, options, DEFAULT_CONNECTION).await
    }

    /// Closes and removes the connection registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConnectionNotFound`] if no such connection exists, or
    /// [`ModelError::Store`] if closing the client fails. The entry is removed either way.
    pub async fn disconnect(&self, name: &str) -> ModelResult<()> {
        let entry = self
            .entries
            .write()
            .remove(name)
            .ok_or_else(|| ModelError::ConnectionNotFound(name.to_string()))?;

        info!(connection = name, "disconnecting");

        Ok(entry.handle.client().close().await?)
    }

    /// Closes and removes every connection.
    ///
    /// # Errors
    ///
    /// Every client is closed even if some fail; the first failure is returned.
    pub async fn disconnect_all(&self) -> ModelResult<()> {
        let drained = self
            .entries
            .write()
            .drain()
            .collect::<Vec<_>>();

        let mut first_error = None;

        for (name, entry) in drained {
            info!(connection = %name, "disconnecting");

            if let Err(e) = entry.handle.client().close().await {
                warn!(connection = %name, error = %e, "failed to close connection");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Teardown: closes every connection.
    pub async fn shutdown(&self) -> ModelResult<()> {
        self.disconnect_all().await
    }

    /// The explicit handle if given, otherwise the default connection.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConnectionNotFound`] when no explicit handle is given and
    /// no default connection is registered.
    pub fn resolve(&self, explicit: Option<&Handle>) -> ModelResult<Handle> {
        match explicit {
            Some(handle) => Ok(handle.clone()),
            None => self.get(DEFAULT_CONNECTION),
        }
    }

    /// The handle registered as `name`.
    pub fn get(&self, name: &str) -> ModelResult<Handle> {
        self.entries
            .read()
            .get(name)
            .map(|entry| entry.handle.clone())
            .ok_or_else(|| ModelError::ConnectionNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// Names of all registered connections, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self
            .entries
            .read()
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The query proxy for `M` bound to the connection registered as `name`.
    ///
    /// The proxy is built once per model type and connection and shared afterwards,
    /// including between concurrent first callers.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::ConnectionNotFound`] if `name` is not registered.
    pub fn with<M: Model>(&self, name: &str) -> ModelResult<Arc<ModelProxy<M>>> {
        let entries = self.entries.read();
        let entry = entries
            .get(name)
            .ok_or_else(|| ModelError::ConnectionNotFound(name.to_string()))?;

        let mut bound = entry.bound.lock();
        let cached = bound
            .entry(TypeId::of::<M>())
            .or_insert_with(|| Arc::new(ModelProxy::<M>::new(entry.handle.clone())) as Arc<dyn Any + Send + Sync>)
            .clone();

        cached
            .downcast::<ModelProxy<M>>()
            .map_err(|_| ModelError::ConnectionNotFound(name.to_string()))
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connector", &self.connector)
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{StoreError, StoreResult},
        model::tests::Dummy,
    };
    use async_trait::async_trait;

    #[derive(Debug)]
    struct Unreachable;

    #[async_trait]
    impl StoreConnector for Unreachable {
        async fn open_client(
            &self,
            config: &ConnectionConfig,
            _options: &ConnectOptions,
        ) -> StoreResult<Arc<dyn StoreClient>> {
            Err(StoreError::Initialization(format!("no route to {}", config.uri)))
        }
    }

    #[tokio::test]
    async fn test_failed_connect_registers_nothing() {
        let registry = ConnectionRegistry::new(Unreachable);

        let result = registry
            .connect_default(&ConnectionConfig::new("mongodb://nowhere", "app"), &ConnectOptions::default())
            .await;

        assert!(matches!(result, Err(ModelError::Store(StoreError::Initialization(_)))));
        assert!(registry.is_empty());
        assert!(!registry.contains(DEFAULT_CONNECTION));
    }

    #[tokio::test]
    async fn test_unknown_names_are_reported() {
        let registry = ConnectionRegistry::new(Unreachable);

        assert!(matches!(registry.get("archive"), Err(ModelError::ConnectionNotFound(name)) if name == "archive"));
        assert!(matches!(registry.resolve(None), Err(ModelError::ConnectionNotFound(name)) if name == DEFAULT_CONNECTION));
        assert!(matches!(registry.with::<Dummy>("archive"), Err(ModelError::ConnectionNotFound(_))));
        assert!(matches!(registry.disconnect("archive").await, Err(ModelError::ConnectionNotFound(_))));
        assert!(registry.disconnect_all().await.is_ok());
    }
}
