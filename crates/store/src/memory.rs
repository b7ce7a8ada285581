use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::MedicineId;
use tokio::sync::RwLock;

use crate::{
    Document, DocumentQuery, Result, StoreError, Version,
    store::{DocumentStore, PutOptions, StockChange, StockLedger, apply_delta, plan_adjustments},
};

type DocumentKey = (String, String);

/// Collection whose documents carry a unique `order_number`.
const ORDERS: &str = "orders";

fn order_number(document: &Document) -> Option<&str> {
    if document.collection != ORDERS {
        return None;
    }
    document.state.get("order_number").and_then(|v| v.as_str())
}

/// In-memory document store for tests and single-process deployments.
///
/// Provides the same interface and concurrency checks as the PostgreSQL
/// implementation.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<DocumentKey, Document>>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of documents stored.
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// Removes all documents.
    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, mut document: Document, options: PutOptions) -> Result<Version> {
        let key = (document.collection.clone(), document.id.clone());
        let mut documents = self.documents.write().await;

        let existing = documents.get(&key);
        let current_version = existing.map(|d| d.version).unwrap_or(Version::initial());

        if let Some(expected) = options.expected_version
            && current_version != expected
        {
            return Err(StoreError::conflict(
                document.collection,
                document.id,
                expected,
                current_version,
            ));
        }

        // Same rule as the unique index on order numbers in PostgreSQL.
        if let Some(number) = order_number(&document)
            && documents
                .values()
                .any(|other| other.id != document.id && order_number(other) == Some(number))
        {
            return Err(StoreError::DuplicateKey {
                collection: document.collection.clone(),
                key: number.to_string(),
            });
        }

        let new_version = current_version.next();
        if let Some(existing) = existing {
            document.created_at = existing.created_at;
        }
        document.version = new_version;
        document.updated_at = Utc::now();
        documents.insert(key, document);

        Ok(new_version)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>> {
        let documents = self.documents.read().await;
        let mut matches: Vec<_> = documents
            .values()
            .filter(|d| {
                if d.collection != query.collection {
                    return false;
                }
                if let Some(ref owner) = query.owner
                    && d.owner.as_ref() != Some(owner)
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();

        matches.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(matches.into_iter().skip(offset).take(limit).collect())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool> {
        let mut documents = self.documents.write().await;
        Ok(documents
            .remove(&(collection.to_string(), id.to_string()))
            .is_some())
    }
}

/// In-memory stock ledger.
///
/// Each adjustment holds the write lock for the whole read-modify-write,
/// which makes it atomic with respect to every other adjustment.
#[derive(Clone, Default)]
pub struct InMemoryStockLedger {
    levels: Arc<RwLock<HashMap<MedicineId, u32>>>,
}

impl InMemoryStockLedger {
    /// Creates a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with the given stock levels.
    pub fn with_stock(levels: impl IntoIterator<Item = (MedicineId, u32)>) -> Self {
        Self {
            levels: Arc::new(RwLock::new(levels.into_iter().collect())),
        }
    }
}

#[async_trait]
impl StockLedger for InMemoryStockLedger {
    async fn stock_level(&self, medicine_id: &MedicineId) -> Result<Option<u32>> {
        Ok(self.levels.read().await.get(medicine_id).copied())
    }

    async fn set_stock(&self, medicine_id: &MedicineId, quantity: u32) -> Result<()> {
        self.levels
            .write()
            .await
            .insert(medicine_id.clone(), quantity);
        Ok(())
    }

    async fn adjust(&self, medicine_id: &MedicineId, delta: i64) -> Result<u32> {
        let mut levels = self.levels.write().await;
        let current = levels
            .get_mut(medicine_id)
            .ok_or_else(|| StoreError::UnknownMedicine(medicine_id.clone()))?;
        let next = apply_delta(medicine_id, *current, delta)?;
        *current = next;
        Ok(next)
    }

    async fn adjust_all(&self, changes: &[StockChange]) -> Result<Vec<u32>> {
        let mut levels = self.levels.write().await;

        let touched: HashMap<MedicineId, u32> = changes
            .iter()
            .filter_map(|c| {
                levels
                    .get(&c.medicine_id)
                    .map(|level| (c.medicine_id.clone(), *level))
            })
            .collect();

        // Nothing is written unless every change fits.
        let (planned, results) = plan_adjustments(touched, changes)?;
        levels.extend(planned);

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentStoreExt;

    fn doc(collection: &str, id: &str, owner: &str) -> Document {
        Document::new(collection, id, &serde_json::json!({ "id": id }))
            .unwrap()
            .owned_by(owner)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = InMemoryDocumentStore::new();

        let version = store
            .put(doc("carts", "u1", "u1"), PutOptions::expect_new())
            .await
            .unwrap();
        assert_eq!(version, Version::first());

        let stored = store.get("carts", "u1").await.unwrap().unwrap();
        assert_eq!(stored.version, Version::first());
        assert!(store.exists("carts", "u1").await.unwrap());
        assert!(!store.exists("orders", "u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrency_conflict() {
        let store = InMemoryDocumentStore::new();
        store
            .put(doc("carts", "u1", "u1"), PutOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .put(doc("carts", "u1", "u1"), PutOptions::expect_new())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));

        let version = store
            .put(
                doc("carts", "u1", "u1"),
                PutOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();
        assert_eq!(version, Version::new(2));
    }

    #[tokio::test]
    async fn test_duplicate_order_number_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let order = |id: &str, number: &str| {
            Document::new("orders", id, &serde_json::json!({ "id": id, "order_number": number }))
                .unwrap()
                .owned_by("u1")
        };

        store
            .put(order("o1", "MED12345678001"), PutOptions::expect_new())
            .await
            .unwrap();

        let result = store
            .put(order("o2", "MED12345678001"), PutOptions::expect_new())
            .await;
        assert!(matches!(
            result,
            Err(StoreError::DuplicateKey { ref key, .. }) if key == "MED12345678001"
        ));
        assert!(store.get("orders", "o2").await.unwrap().is_none());

        // Rewriting the same order keeps its number.
        store
            .put(
                order("o1", "MED12345678001"),
                PutOptions::expect_version(Version::first()),
            )
            .await
            .unwrap();

        // Other collections are not indexed.
        store
            .put(
                Document::new("carts", "c1", &serde_json::json!({ "order_number": "MED12345678001" }))
                    .unwrap(),
                PutOptions::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_query_by_owner_with_paging() {
        let store = InMemoryDocumentStore::new();
        for i in 0..5 {
            store
                .put(doc("orders", &format!("o{i}"), "u1"), PutOptions::new())
                .await
                .unwrap();
        }
        store
            .put(doc("orders", "other", "u2"), PutOptions::new())
            .await
            .unwrap();

        let all = store
            .query(DocumentQuery::collection("orders").owner("u1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 5);

        let page = store
            .query(DocumentQuery::collection("orders").owner("u1").limit(2).offset(4))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = InMemoryDocumentStore::new();
        store
            .put(doc("carts", "u1", "u1"), PutOptions::new())
            .await
            .unwrap();

        assert!(store.delete("carts", "u1").await.unwrap());
        assert!(!store.delete("carts", "u1").await.unwrap());
        assert_eq!(store.document_count().await, 0);
    }

    #[tokio::test]
    async fn test_adjust_floor_at_zero() {
        let ledger = InMemoryStockLedger::with_stock([(MedicineId::new("A"), 3)]);

        assert_eq!(ledger.adjust(&MedicineId::new("A"), -2).await.unwrap(), 1);
        let err = ledger.adjust(&MedicineId::new("A"), -2).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));
        assert_eq!(
            ledger.stock_level(&MedicineId::new("A")).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_adjust_all_is_all_or_nothing() {
        let ledger = InMemoryStockLedger::with_stock([
            (MedicineId::new("A"), 10),
            (MedicineId::new("B"), 1),
        ]);

        let result = ledger
            .adjust_all(&[StockChange::new("A", -5), StockChange::new("B", -2)])
            .await;
        assert!(result.is_err());
        assert_eq!(
            ledger.stock_level(&MedicineId::new("A")).await.unwrap(),
            Some(10)
        );

        let levels = ledger
            .adjust_all(&[StockChange::new("A", -5), StockChange::new("B", -1)])
            .await
            .unwrap();
        assert_eq!(levels, vec![5, 0]);
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_oversell() {
        let ledger = InMemoryStockLedger::with_stock([(MedicineId::new("A"), 5)]);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.adjust(&MedicineId::new("A"), -1).await.is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 5);
        assert_eq!(
            ledger.stock_level(&MedicineId::new("A")).await.unwrap(),
            Some(0)
        );
    }
}
