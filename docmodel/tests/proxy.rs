mod common;

use bson::{Bson, doc, oid::ObjectId};
use common::{DATABASE, Note, Order, connected, seed_orders};
use docmodel::{memory::ID_INDEX, prelude::*};

#[tokio::test]
async fn test_insert_one_returns_stored_instance() {
    let (server, registry) = connected().await;
    let orders = Order::on(&registry).unwrap();

    let order = orders
        .insert_one(doc! { "customer": "alice", "amount": 250 })
        .await
        .unwrap();

    assert!(order.id.is_some());
    assert_eq!(order.customer, "alice");
    assert_eq!(order.status, "");

    let stored = server.documents(DATABASE, "orders").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_object_id("_id").ok(), order.id);
}

#[tokio::test]
async fn test_insert_keeps_given_identity() {
    let (_server, registry) = connected().await;
    let orders = Order::on(&registry).unwrap();
    let id = ObjectId::new();

    let order = orders
        .insert_one(doc! { "_id": id, "customer": "bob", "amount": 10 })
        .await
        .unwrap();
    assert_eq!(order.id(), Some(&id));

    let duplicate = orders
        .insert_one(doc! { "_id": id, "customer": "bob", "amount": 20 })
        .await;
    assert!(matches!(duplicate, Err(ModelError::Store(StoreError::DuplicateKey(..)))));
}

#[tokio::test]
async fn test_schema_rejection_never_reaches_store() {
    let (server, registry) = connected().await;
    let orders = Order::on(&registry).unwrap();

    let missing = orders.insert_one(doc! { "customer": "alice" }).await;
    let negative = orders
        .insert_many(vec![
            doc! { "customer": "alice", "amount": 5 },
            doc! { "customer": "bob", "amount": -5 },
        ])
        .await;

    assert!(matches!(missing, Err(ModelError::Validation(_))));
    assert!(matches!(negative, Err(ModelError::Validation(_))));
    assert_eq!(server.operation_count(), 0);
    assert!(server.documents(DATABASE, "orders").await.is_empty());
}

#[tokio::test]
async fn test_find_with_sort_and_projection() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();

    let found = orders
        .find(
            doc! { "customer": "alice" },
            FindOptions::builder().with_sort("-amount").with_projection("-status").build(),
        )
        .await
        .unwrap();

    assert_eq!(found.iter().map(|o| o.amount).collect::<Vec<_>>(), vec![250, 180]);
    assert!(found.iter().all(|o| o.status.is_empty()));
}

#[tokio::test]
async fn test_find_one_absent_is_none() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;

    let found = Order::on(&registry)
        .unwrap()
        .find_one(doc! { "customer": "zed" }, FindOptions::default())
        .await
        .unwrap();

    assert_eq!(found, None);
}

#[tokio::test]
async fn test_find_by_id_accepts_hex_string() {
    let (_server, registry) = connected().await;
    let seeded = seed_orders(&registry).await;
    let target = seeded[1].id.unwrap();

    let found = Order::on(&registry)
        .unwrap()
        .find_by_id(target.to_hex(), FindOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(found.customer, "bob");
}

#[tokio::test]
async fn test_malformed_id_fails_before_store() {
    let (server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();
    let before = server.operation_count();

    let found = orders.find_by_id("not-an-id", FindOptions::default()).await;
    let updated = orders
        .find_by_id_and_update("123", doc! { "$set": { "status": "x" } }, FindAndModifyOptions::default())
        .await;
    let deleted = orders
        .find_by_id_and_delete(String::from("zz"), FindAndModifyOptions::default())
        .await;

    assert!(matches!(found, Err(ModelError::IdentityCast(_))));
    assert!(matches!(updated, Err(ModelError::IdentityCast(_))));
    assert!(matches!(deleted, Err(ModelError::IdentityCast(_))));
    assert_eq!(server.operation_count(), before);
}

#[tokio::test]
async fn test_find_by_id_and_update_returns_updated_by_default() {
    let (_server, registry) = connected().await;
    let seeded = seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();
    let id = seeded[1].id.unwrap();

    let after = orders
        .find_by_id_and_update(id, doc! { "$set": { "status": "paid" } }, FindAndModifyOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, "paid");

    let before = orders
        .find_by_id_and_update(
            &id,
            doc! { "$inc": { "amount": 5 } },
            FindAndModifyOptions::returning(ReturnDocument::Before),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.amount, 110);
}

#[tokio::test]
async fn test_find_one_and_update_missing_is_none() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;

    let modified = Order::on(&registry)
        .unwrap()
        .find_one_and_update(
            doc! { "customer": "zed" },
            doc! { "$set": { "status": "paid" } },
            FindAndModifyOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(modified, None);
}

#[tokio::test]
async fn test_find_one_and_replace_validates_replacement() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();

    let invalid = orders
        .find_one_and_replace(doc! { "customer": "bob" }, doc! { "customer": "bob" }, FindAndModifyOptions::default())
        .await;
    assert!(matches!(invalid, Err(ModelError::Validation(_))));

    let replaced = orders
        .find_one_and_replace(
            doc! { "customer": "bob" },
            doc! { "customer": "bob", "amount": 999, "status": "refunded" },
            FindAndModifyOptions::default(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(replaced.amount, 999);
}

#[tokio::test]
async fn test_find_one_and_delete_sorted() {
    let (server, registry) = connected().await;
    seed_orders(&registry).await;

    let removed = Order::on(&registry)
        .unwrap()
        .find_one_and_delete(
            doc! { "customer": "alice" },
            FindAndModifyOptions::builder().with_sort("amount").build(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(removed.amount, 180);
    assert_eq!(server.documents(DATABASE, "orders").await.len(), 2);
}

#[tokio::test]
async fn test_update_counts_match_store() {
    let (server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();

    let one = orders
        .update_one(doc! { "status": "pending" }, doc! { "$set": { "status": "paid" } }, UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(one, 1);

    let many = orders
        .update_many(doc! {}, doc! { "$set": { "status": "shipped" } }, UpdateOptions::default())
        .await
        .unwrap();
    let shipped = server
        .documents(DATABASE, "orders")
        .await
        .iter()
        .filter(|d| d.get_str("status").ok() == Some("shipped"))
        .count();
    assert_eq!(many, 3);
    assert_eq!(shipped, 3);

    let unchanged = orders
        .update_many(doc! {}, doc! { "$set": { "status": "shipped" } }, UpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(unchanged, 0);
}

#[tokio::test]
async fn test_update_one_upsert_counts_insert() {
    let (server, registry) = connected().await;
    let orders = Order::on(&registry).unwrap();

    let affected = orders
        .update_one(
            doc! { "customer": "dave" },
            doc! { "$set": { "amount": 75 } },
            UpdateOptions::upsert(),
        )
        .await
        .unwrap();

    assert_eq!(affected, 1);

    let stored = server.documents(DATABASE, "orders").await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_str("customer").unwrap(), "dave");
    assert_eq!(stored[0].get_i32("amount").unwrap(), 75);
}

#[tokio::test]
async fn test_replace_one_keeps_identity() {
    let (server, registry) = connected().await;
    let seeded = seed_orders(&registry).await;
    let id = seeded[0].id.unwrap();

    let replaced = Order::on(&registry)
        .unwrap()
        .replace_one(
            doc! { "_id": id },
            doc! { "customer": "alice", "amount": 300 },
            UpdateOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(replaced, 1);

    let stored = server.documents(DATABASE, "orders").await;
    let document = stored
        .iter()
        .find(|d| d.get_object_id("_id").ok() == Some(id))
        .unwrap();
    assert_eq!(document.get_i32("amount").unwrap(), 300);
    assert!(!document.contains_key("status"));
}

#[tokio::test]
async fn test_delete_counts_match_store() {
    let (server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();

    let one = orders
        .delete_one(doc! { "customer": "alice" }, DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(one, 1);
    assert_eq!(server.documents(DATABASE, "orders").await.len(), 2);

    let none = orders
        .delete_many(doc! { "customer": "zed" }, DeleteOptions::default())
        .await
        .unwrap();
    assert_eq!(none, 0);

    let rest = orders.delete_many(doc! {}, DeleteOptions::default()).await.unwrap();
    assert_eq!(rest, 2);
    assert!(server.documents(DATABASE, "orders").await.is_empty());
}

#[tokio::test]
async fn test_aggregate_group_totals() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;

    let totals = Order::on(&registry)
        .unwrap()
        .aggregate(
            vec![
                doc! { "$group": { "_id": "$customer", "total": { "$sum": "$amount" } } },
                doc! { "$sort": { "_id": 1 } },
            ],
            AggregateOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(totals, vec![
        doc! { "_id": "alice", "total": 430 },
        doc! { "_id": "bob", "total": 110 },
    ]);
}

#[tokio::test]
async fn test_distinct_values() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();

    let customers = orders.distinct("customer", doc! {}).await.unwrap();
    let pending = orders
        .distinct("customer", doc! { "status": "pending" })
        .await
        .unwrap();

    assert_eq!(customers, vec![Bson::from("alice"), Bson::from("bob")]);
    assert_eq!(pending.len(), 2);
}

#[tokio::test]
async fn test_count_with_options() {
    let (_server, registry) = connected().await;
    seed_orders(&registry).await;
    let orders = Order::on(&registry).unwrap();

    let all = orders.count(doc! {}, CountOptions::default()).await.unwrap();
    let capped = orders
        .count(doc! {}, CountOptions { limit: Some(2), ..CountOptions::default() })
        .await
        .unwrap();
    let big = orders
        .count(doc! { "amount": { "$gt": 150 } }, CountOptions::default())
        .await
        .unwrap();

    assert_eq!((all, capped, big), (3, 2, 2));
}

#[tokio::test]
async fn test_ensure_indexes_creates_declared_indexes() {
    let (_server, registry) = connected().await;
    let orders = Order::on(&registry).unwrap();

    let created = orders.ensure_indexes().await.unwrap();
    assert_eq!(created, vec!["customer_1_amount_-1".to_string(), "by_status".to_string()]);

    let names = orders.list_index_names().await.unwrap();
    assert_eq!(names, vec![ID_INDEX.to_string(), "customer_1_amount_-1".to_string(), "by_status".to_string()]);
}

#[tokio::test]
async fn test_ensure_indexes_without_declarations_is_noop() {
    let (server, registry) = connected().await;

    let created = Note::on(&registry).unwrap().ensure_indexes().await.unwrap();

    assert!(created.is_empty());
    assert_eq!(server.operation_count(), 0);
}

#[tokio::test]
async fn test_store_failure_surfaces_as_store_error() {
    let (server, registry) = connected().await;
    server.inject_failure("find").await;

    let result = Note::on(&registry)
        .unwrap()
        .find(doc! {}, FindOptions::default())
        .await;

    let err = result.unwrap_err();
    assert!(err.is_store_error());
    assert!(matches!(err, ModelError::Store(StoreError::Backend(_))));
}

#[tokio::test]
async fn test_invalid_stored_document_fails_normalization() {
    let (_server, registry) = connected().await;
    let orders = Order::on(&registry).unwrap();

    orders
        .collection()
        .insert_one(doc! { "customer": "raw", "amount": "not a number" })
        .await
        .unwrap();

    let result = orders.find(doc! {}, FindOptions::default()).await;

    assert!(matches!(result, Err(ModelError::Validation(_))));
}

#[tokio::test]
async fn test_inc_overflow_leaves_document_untouched() {
    let (server, registry) = connected().await;
    let notes = Note::on(&registry).unwrap();
    let note = notes
        .insert_one(doc! { "text": "counter", "hits": i64::MAX })
        .await
        .unwrap();

    let result = notes
        .update_one(doc! { "_id": note.id }, doc! { "$inc": { "hits": 1_i64 } }, UpdateOptions::default())
        .await;

    assert!(matches!(result, Err(ModelError::Store(StoreError::InvalidOperation(_)))));
    assert_eq!(server.documents(DATABASE, "notes").await[0].get_i64("hits").unwrap(), i64::MAX);
}

#[tokio::test]
async fn test_aggregate_sum_overflow_widens_to_double() {
    let (_server, registry) = connected().await;
    let notes = Note::on(&registry).unwrap();
    notes
        .insert_many(vec![
            doc! { "text": "a", "hits": i64::MAX },
            doc! { "text": "b", "hits": 1_i64 },
        ])
        .await
        .unwrap();

    let totals = notes
        .aggregate(
            vec![doc! { "$group": { "_id": null, "total": { "$sum": "$hits" } } }],
            AggregateOptions::default(),
        )
        .await
        .unwrap();

    assert!(matches!(totals[0].get("total"), Some(Bson::Double(_))));
}
