//! A data-mapping layer over a document store.
//!
//! This crate is the core of the docmodel project and provides:
//!
//! - **Model traits** ([`model`]) - Schema-validated model types and their instances
//! - **Connection registry** ([`registry`]) - Named connections with an explicit lifecycle
//! - **Query proxy** ([`proxy`]) - CRUD and query operations bound to one connection
//! - **Result normalization** ([`normalize`]) - Raw store results turned into instances
//! - **Pagination** ([`page`]) - Paged finds and their metadata
//! - **Store backend abstraction** ([`backend`]) - Traits a store driver implements
//! - **Options and shorthand** ([`options`], [`adapter`]) - Typed operation options,
//!   `"name -age"` field and sort shorthand
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//! use bson::{doc, oid::ObjectId};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
//!     pub id: Option<ObjectId>,
//!     pub name: String,
//! }
//!
//! impl Model for User {
//!     fn collection_name() -> &'static str {
//!         "users"
//!     }
//!
//!     fn schema() -> &'static dyn Schema {
//!         &Permissive
//!     }
//!
//!     fn id(&self) -> Option<&ObjectId> {
//!         self.id.as_ref()
//!     }
//! }
//!
//! let user = User::on(&registry)?.insert_one(doc! { "name": "Ren" }).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_core;

pub mod adapter;
pub mod backend;
pub mod config;
pub mod error;
pub mod identity;
pub mod model;
pub mod normalize;
pub mod options;
pub mod page;
pub mod proxy;
pub mod registry;
pub mod schema;
