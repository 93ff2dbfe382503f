//! Main docmodel crate: typed document models over a document database.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports the core
//! types from the sub-crates and gives access to the store backends.
//!
//! # Features
//!
//! - **Schema-validated models** - Instances are only ever built from validated data
//! - **Named connections** - A [`ConnectionRegistry`](registry::ConnectionRegistry) with
//!   an explicit connect / disconnect / shutdown lifecycle
//! - **Uniform query proxy** - CRUD and query operations with typed options and
//!   `"name -age"` field and sort shorthand
//! - **Pagination** - Concurrent count and page query with complete paging metadata
//! - **Multiple backends** - In-memory and MongoDB
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryServer};
//! use bson::{doc, oid::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Customer {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! impl Model for Customer {
//!     fn collection_name() -> &'static str { "customers" }
//!     fn schema() -> &'static dyn Schema { &Permissive }
//!     fn id(&self) -> Option<&ObjectId> { self.id.as_ref() }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(InMemoryServer::new());
//!     registry
//!         .connect_default(&ConnectionConfig::new("memory://local", "shop"), &ConnectOptions::default())
//!         .await?;
//!
//!     let customers = Customer::on(&registry)?;
//!     customers.insert_one(doc! { "name": "Alice" }).await?;
//!
//!     let page = customers
//!         .paged_find(doc! {}, 1, 20, FindOptions::builder().with_sort("name").build())
//!         .await?;
//!     println!("{} of {} customers", page.data.len(), page.items.total);
//!
//!     registry.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Named connections
//!
//! ```ignore
//! registry.connect(&archive_config, &ConnectOptions::default(), "archive").await?;
//!
//! // Memoized per model type and connection name.
//! let archived = Customer::with(&registry, "archive")?;
//! let count = archived.count(doc! {}, CountOptions::default()).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    adapter, backend, config, error, identity, model, normalize, options, page, proxy, registry, schema,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{ID_INDEX, InMemoryClient, InMemoryCollection, InMemoryDatabase, InMemoryServer};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoClient, MongoCollection, MongoConnector, MongoDatabase};
}
