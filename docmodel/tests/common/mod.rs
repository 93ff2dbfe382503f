#![allow(dead_code)]

use bson::{Bson, Document, doc, oid::ObjectId};
use docmodel::{memory::InMemoryServer, prelude::*};
use serde::{Deserialize, Serialize};

pub const DATABASE: &str = "shop";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub customer: String,
    pub amount: i32,
    #[serde(default)]
    pub status: String,
}

fn order_schema(candidate: Document) -> Result<Document, ValidationError> {
    match candidate.get("customer") {
        Some(Bson::String(customer)) if !customer.is_empty() => {}
        _ => return Err(ValidationError::new("\"customer\" is required")),
    }

    match candidate.get("amount") {
        Some(Bson::Int32(amount)) if *amount >= 0 => Ok(candidate),
        Some(Bson::Int32(_)) => Err(ValidationError::new("\"amount\" must be positive")),
        _ => Err(ValidationError::new("\"amount\" is required")),
    }
}

impl Model for Order {
    fn collection_name() -> &'static str {
        "orders"
    }

    fn schema() -> &'static dyn Schema {
        &order_schema
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![
            IndexSpec::new("customer -amount"),
            IndexSpec::new("status").with_name("by_status"),
        ]
    }

    fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub text: String,
}

impl Model for Note {
    fn collection_name() -> &'static str {
        "notes"
    }

    fn schema() -> &'static dyn Schema {
        &Permissive
    }

    fn id(&self) -> Option<&ObjectId> {
        self.id.as_ref()
    }
}

pub fn config(database: &str) -> ConnectionConfig {
    ConnectionConfig::new("memory://localhost", database)
}

/// A registry with the default connection open on a fresh server.
pub async fn connected() -> (InMemoryServer, ConnectionRegistry) {
    let server = InMemoryServer::new();
    let registry = ConnectionRegistry::new(server.clone());

    registry
        .connect_default(&config(DATABASE), &ConnectOptions::default())
        .await
        .unwrap();

    (server, registry)
}

pub async fn seed_orders(registry: &ConnectionRegistry) -> Vec<Order> {
    Order::on(registry)
        .unwrap()
        .insert_many(vec![
            doc! { "customer": "alice", "amount": 250, "status": "paid" },
            doc! { "customer": "bob", "amount": 110, "status": "pending" },
            doc! { "customer": "alice", "amount": 180, "status": "pending" },
        ])
        .await
        .unwrap()
}
