//! Persistence layer for carts, orders and medicine stock.
//!
//! Aggregates are stored as versioned JSON documents; stock levels live in a
//! separate ledger whose adjustments are single atomic conditional updates.

pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use document::{Document, Version};
pub use error::{Result, StoreError};
pub use memory::{InMemoryDocumentStore, InMemoryStockLedger};
pub use postgres::PostgresStore;
pub use query::DocumentQuery;
pub use store::{DocumentStore, DocumentStoreExt, PutOptions, StockChange, StockLedger};
