//! In-memory document store backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the store capability
//! traits in [`docmodel_core::backend`]. It uses async-aware read-write locks for
//! concurrent access and is meant for development and tests.
//!
//! # Features
//!
//! - **MongoDB query subset** - Filters, sorts, projections, update operators and
//!   aggregation pipelines over BSON documents
//! - **Shared server state** - Clients opened from one [`InMemoryServer`] see the same data
//! - **Test hooks** - Operation and open-client counters, one-shot failure injection
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryServer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = InMemoryServer::new();
//!     let registry = ConnectionRegistry::new(server.clone());
//!
//!     registry
//!         .connect_default(&ConnectionConfig::new("memory://local", "app"), &ConnectOptions::default())
//!         .await?;
//!
//!     let user = User::on(&registry)?.insert_one(doc! { "name": "Alice" }).await?;
//!     assert_eq!(server.documents("app", "users").await.len(), 1);
//!
//!     registry.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

mod aggregate;
mod evaluator;
mod update;
pub mod store;

pub use store::{ID_INDEX, InMemoryClient, InMemoryCollection, InMemoryDatabase, InMemoryServer};
