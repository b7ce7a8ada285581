//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::MedicineId;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    Document, DocumentQuery, DocumentStore, DocumentStoreExt, PostgresStore, PutOptions,
    StockChange, StockLedger, StoreError, Version,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    _container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_documents_and_stock.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                _container: container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE documents, medicine_stock")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn order_doc(id: &str, order_number: &str, owner: &str) -> Document {
    Document::new(
        "orders",
        id,
        &serde_json::json!({ "order_number": order_number }),
    )
    .unwrap()
    .owned_by(owner)
}

#[tokio::test]
#[serial]
async fn put_and_load_document() {
    let store = get_test_store().await;

    let version = store
        .put(order_doc("o1", "MED1", "u1"), PutOptions::expect_new())
        .await
        .unwrap();
    assert_eq!(version, Version::first());

    let (state, version): (serde_json::Value, Version) =
        store.load("orders", "o1").await.unwrap().unwrap();
    assert_eq!(state["order_number"], "MED1");
    assert_eq!(version, Version::first());
}

#[tokio::test]
#[serial]
async fn optimistic_concurrency_conflict() {
    let store = get_test_store().await;
    store
        .put(order_doc("o1", "MED1", "u1"), PutOptions::expect_new())
        .await
        .unwrap();

    let result = store
        .put(order_doc("o1", "MED1", "u1"), PutOptions::expect_new())
        .await;
    assert!(matches!(
        result,
        Err(StoreError::ConcurrencyConflict { .. })
    ));

    let stale = store
        .put(
            order_doc("o1", "MED1", "u1"),
            PutOptions::expect_version(Version::new(5)),
        )
        .await;
    assert!(matches!(
        stale,
        Err(StoreError::ConcurrencyConflict { actual, .. }) if actual == Version::first()
    ));

    let version = store
        .put(
            order_doc("o1", "MED1", "u1"),
            PutOptions::expect_version(Version::first()),
        )
        .await
        .unwrap();
    assert_eq!(version, Version::new(2));
}

#[tokio::test]
#[serial]
async fn duplicate_order_number_rejected() {
    let store = get_test_store().await;
    store
        .put(order_doc("o1", "MED1", "u1"), PutOptions::expect_new())
        .await
        .unwrap();

    let result = store
        .put(order_doc("o2", "MED1", "u1"), PutOptions::expect_new())
        .await;
    assert!(matches!(result, Err(StoreError::DuplicateKey { .. })));
}

#[tokio::test]
#[serial]
async fn query_by_owner() {
    let store = get_test_store().await;
    for i in 0..3 {
        store
            .put(
                order_doc(&format!("o{i}"), &format!("MED{i}"), "u1"),
                PutOptions::expect_new(),
            )
            .await
            .unwrap();
    }
    store
        .put(order_doc("x", "MEDX", "u2"), PutOptions::expect_new())
        .await
        .unwrap();

    let docs = store
        .query(DocumentQuery::collection("orders").owner("u1"))
        .await
        .unwrap();
    assert_eq!(docs.len(), 3);

    let page = store
        .query(DocumentQuery::collection("orders").limit(2))
        .await
        .unwrap();
    assert_eq!(page.len(), 2);
}

#[tokio::test]
#[serial]
async fn stock_adjust_is_conditional() {
    let store = get_test_store().await;
    let id = MedicineId::new("MED-A");
    store.set_stock(&id, 3).await.unwrap();

    assert_eq!(store.adjust(&id, -2).await.unwrap(), 1);
    let err = store.adjust(&id, -2).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InsufficientStock { available: 1, .. }
    ));
    assert_eq!(store.adjust(&id, 4).await.unwrap(), 5);

    let unknown = store.adjust(&MedicineId::new("nope"), 1).await;
    assert!(matches!(unknown, Err(StoreError::UnknownMedicine(_))));
}

#[tokio::test]
#[serial]
async fn stock_adjust_all_rolls_back() {
    let store = get_test_store().await;
    let a = MedicineId::new("MED-A");
    let b = MedicineId::new("MED-B");
    store.set_stock(&a, 10).await.unwrap();
    store.set_stock(&b, 1).await.unwrap();

    let result = store
        .adjust_all(&[
            StockChange::new(a.clone(), -4),
            StockChange::new(b.clone(), -2),
        ])
        .await;
    assert!(result.is_err());
    assert_eq!(store.stock_level(&a).await.unwrap(), Some(10));
    assert_eq!(store.stock_level(&b).await.unwrap(), Some(1));

    let levels = store
        .adjust_all(&[StockChange::new(a.clone(), -4), StockChange::new(b, -1)])
        .await
        .unwrap();
    assert_eq!(levels, vec![6, 0]);
}

#[tokio::test]
#[serial]
async fn concurrent_decrements_never_oversell() {
    let store = get_test_store().await;
    let id = MedicineId::new("MED-A");
    store.set_stock(&id, 5).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(
            async move { store.adjust(&id, -1).await.is_ok() },
        ));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 5);
    assert_eq!(store.stock_level(&id).await.unwrap(), Some(0));
}
