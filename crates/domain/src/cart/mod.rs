//! Cart aggregate and related types.

mod aggregate;
mod service;

pub use aggregate::{Cart, CartLineItem, CartSnapshot, MedicineSnapshot};
pub use service::CartService;

use common::MedicineId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::pricing::{PricingEngine, PricingError};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Resulting quantity is zero or above the per-item ceiling.
    #[error("Invalid quantity: {quantity} (must be between 1 and {max})")]
    InvalidQuantity { quantity: u64, max: u32 },

    /// Resulting quantity exceeds the stock known at add time.
    #[error("Insufficient stock for {medicine_id}: requested {requested}, available {available}")]
    InsufficientStock {
        medicine_id: MedicineId,
        requested: u64,
        available: u32,
    },

    /// Line item not found in the cart.
    #[error("Item not found: {medicine_id}")]
    ItemNotFound { medicine_id: MedicineId },

    /// Coupon data is inconsistent.
    #[error(transparent)]
    Pricing(#[from] PricingError),
}

impl CartError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::InvalidQuantity { .. } => ErrorKind::InvalidQuantity,
            CartError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            CartError::ItemNotFound { .. } => ErrorKind::NotFound,
            CartError::Pricing(PricingError::InvalidCouponAmount { .. }) => {
                ErrorKind::InvalidCouponAmount
            }
        }
    }
}

/// Quantity limits enforced on every cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLimits {
    /// Maximum units of a single medicine per cart.
    pub max_quantity_per_item: u32,
}

impl Default for CartLimits {
    fn default() -> Self {
        Self {
            max_quantity_per_item: 10,
        }
    }
}

/// Everything a cart mutation needs besides its own state.
#[derive(Debug, Clone, Default)]
pub struct CartPolicy {
    pub pricing: PricingEngine,
    pub limits: CartLimits,
}

impl CartPolicy {
    /// Creates a policy from its parts.
    pub fn new(pricing: PricingEngine, limits: CartLimits) -> Self {
        Self { pricing, limits }
    }
}
