use std::collections::HashMap;

use async_trait::async_trait;
use common::MedicineId;
use serde::de::DeserializeOwned;

use crate::{Document, DocumentQuery, Result, StoreError, Version};

/// Options for writing a document.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Version the caller loaded. If None, the write is unconditional.
    pub expected_version: Option<Version>,
}

impl PutOptions {
    /// Creates options with no version check (last write wins).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates options expecting the stored document to be at `version`.
    pub fn expect_version(version: Version) -> Self {
        Self {
            expected_version: Some(version),
        }
    }

    /// Creates options expecting the document to not exist yet.
    pub fn expect_new() -> Self {
        Self {
            expected_version: Some(Version::initial()),
        }
    }
}

/// Storage for aggregates serialized as JSON documents.
///
/// All implementations must be thread-safe (Send + Sync). A single `put` is
/// atomic: readers observe either the previous or the new document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Writes a document and returns its new version.
    ///
    /// If `options.expected_version` is set, the write fails with
    /// `ConcurrencyConflict` unless the stored version matches.
    async fn put(&self, document: Document, options: PutOptions) -> Result<Version>;

    /// Retrieves a document by collection and id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Retrieves documents matching a query, newest first.
    async fn query(&self, query: DocumentQuery) -> Result<Vec<Document>>;

    /// Deletes a document. Returns true if it existed.
    async fn delete(&self, collection: &str, id: &str) -> Result<bool>;
}

/// Extension trait providing typed access to stored documents.
#[async_trait]
pub trait DocumentStoreExt: DocumentStore {
    /// Loads and decodes a document together with its version.
    async fn load<T: DeserializeOwned + Send>(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<(T, Version)>> {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some((doc.decode()?, doc.version))),
            None => Ok(None),
        }
    }

    /// Checks whether a document exists.
    async fn exists(&self, collection: &str, id: &str) -> Result<bool> {
        Ok(self.get(collection, id).await?.is_some())
    }
}

impl<T: DocumentStore + ?Sized> DocumentStoreExt for T {}

/// One stock movement: positive deltas restock, negative deltas consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockChange {
    pub medicine_id: MedicineId,
    pub delta: i64,
}

impl StockChange {
    /// Creates a stock change.
    pub fn new(medicine_id: impl Into<MedicineId>, delta: i64) -> Self {
        Self {
            medicine_id: medicine_id.into(),
            delta,
        }
    }
}

/// Per-medicine stock counters.
///
/// Every adjustment is a single atomic read-modify-write with a floor at zero:
/// two concurrent decrements can never both succeed if together they exceed
/// the available stock.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Returns the current stock, or None if the medicine is unknown.
    async fn stock_level(&self, medicine_id: &MedicineId) -> Result<Option<u32>>;

    /// Sets the absolute stock level, creating the record if needed.
    async fn set_stock(&self, medicine_id: &MedicineId, quantity: u32) -> Result<()>;

    /// Applies `stock += delta` and returns the new level.
    ///
    /// Fails with `InsufficientStock` if the result would be negative.
    async fn adjust(&self, medicine_id: &MedicineId, delta: i64) -> Result<u32>;

    /// Applies all changes or none of them.
    ///
    /// Returns the resulting level for each change, in input order.
    async fn adjust_all(&self, changes: &[StockChange]) -> Result<Vec<u32>>;
}

/// Computes the levels that applying `changes` in order would produce.
///
/// `levels` holds the current stock of every medicine touched by `changes`;
/// repeated medicines see the effect of earlier changes.
pub(crate) fn plan_adjustments(
    mut levels: HashMap<MedicineId, u32>,
    changes: &[StockChange],
) -> Result<(HashMap<MedicineId, u32>, Vec<u32>)> {
    let mut results = Vec::with_capacity(changes.len());

    for change in changes {
        let current = *levels
            .get(&change.medicine_id)
            .ok_or_else(|| StoreError::UnknownMedicine(change.medicine_id.clone()))?;
        let next = apply_delta(&change.medicine_id, current, change.delta)?;
        levels.insert(change.medicine_id.clone(), next);
        results.push(next);
    }

    Ok((levels, results))
}

/// Applies a delta to a stock level, enforcing the zero floor.
pub(crate) fn apply_delta(medicine_id: &MedicineId, current: u32, delta: i64) -> Result<u32> {
    let next = i64::from(current) + delta;
    if next < 0 {
        return Err(StoreError::InsufficientStock {
            medicine_id: medicine_id.clone(),
            requested: delta.unsigned_abs(),
            available: current,
        });
    }
    u32::try_from(next).map_err(|_| StoreError::InsufficientStock {
        medicine_id: medicine_id.clone(),
        requested: delta.unsigned_abs(),
        available: current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_delta_floors_at_zero() {
        let id = MedicineId::new("MED-1");
        assert_eq!(apply_delta(&id, 5, -5).unwrap(), 0);
        assert_eq!(apply_delta(&id, 5, 3).unwrap(), 8);

        let err = apply_delta(&id, 5, -6).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 6,
                available: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_plan_sees_repeated_medicines() {
        let levels = HashMap::from([(MedicineId::new("A"), 4)]);
        let changes = vec![StockChange::new("A", -3), StockChange::new("A", -2)];

        let result = plan_adjustments(levels, &changes);
        assert!(matches!(
            result,
            Err(StoreError::InsufficientStock { available: 1, .. })
        ));
    }

    #[test]
    fn test_plan_unknown_medicine() {
        let changes = vec![StockChange::new("missing", -1)];
        let result = plan_adjustments(HashMap::new(), &changes);
        assert!(matches!(result, Err(StoreError::UnknownMedicine(_))));
    }
}
