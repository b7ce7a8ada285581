//! Fulfillment error types.

use common::MedicineId;
use domain::{DomainError, ErrorKind};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during fulfillment workflows.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Saving a new order failed and some stock could not be put back.
    #[error("Order {order_number} was not saved and stock for {unrestored:?} could not be restored: {source}")]
    CompensationFailed {
        order_number: String,
        unrestored: Vec<MedicineId>,
        #[source]
        source: DomainError,
    },
}

impl From<StoreError> for FulfillmentError {
    fn from(e: StoreError) -> Self {
        FulfillmentError::Domain(e.into())
    }
}

impl FulfillmentError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Domain(e) => e.kind(),
            FulfillmentError::CompensationFailed { .. } => ErrorKind::Storage,
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
