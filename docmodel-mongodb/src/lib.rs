//! MongoDB backend implementation for docmodel.
//!
//! This crate implements the store capability traits of [`docmodel_core::backend`] on
//! top of the official `mongodb` driver. Options are translated field by field onto the
//! driver's option types; driver errors surface as
//! [`StoreError`](docmodel_core::error::StoreError).
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docmodel = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use docmodel::{prelude::*, mongodb::MongoConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = ConnectionRegistry::new(MongoConnector::new());
//!     registry
//!         .connect_default(&ConnectionConfig::from_env()?, &ConnectOptions::default())
//!         .await?;
//!
//!     // Reach the driver collection for anything the proxy does not cover.
//!     let collection = User::on(&registry)?.collection();
//!     if let Some(mongo) = collection.downcast_ref::<MongoCollection>() {
//!         mongo.inner().drop().await?;
//!     }
//!
//!     registry.shutdown().await?;
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_mongodb;

pub mod store;

pub use store::{MongoClient, MongoCollection, MongoConnector, MongoDatabase};
