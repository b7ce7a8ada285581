use common::MedicineId;
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The document changed since it was loaded.
    #[error(
        "Concurrency conflict for {collection}/{id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        collection: String,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// A uniqueness constraint rejected the write.
    #[error("Duplicate key in {collection}: {key}")]
    DuplicateKey { collection: String, key: String },

    /// A decrement would take the stock below zero.
    #[error("Insufficient stock for medicine {medicine_id}: requested {requested}, available {available}")]
    InsufficientStock {
        medicine_id: MedicineId,
        requested: u64,
        available: u32,
    },

    /// The medicine has no stock record.
    #[error("Unknown medicine: {0}")]
    UnknownMedicine(MedicineId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Builds a conflict error and records it.
    pub(crate) fn conflict(collection: String, id: String, expected: Version, actual: Version) -> Self {
        metrics::counter!("store_conflicts_total", "collection" => collection.clone()).increment(1);
        tracing::warn!(%collection, %id, %expected, %actual, "Optimistic concurrency conflict");
        StoreError::ConcurrencyConflict {
            collection,
            id,
            expected,
            actual,
        }
    }
}
