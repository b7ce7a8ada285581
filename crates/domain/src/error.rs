//! Domain error types.

use serde::Serialize;
use store::StoreError;
use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;
use crate::pricing::PricingError;

/// Coarse classification of every failure the core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyCart,
    MissingAddress,
    InvalidQuantity,
    NotFound,
    InsufficientStock,
    ReturnWindowExpired,
    InvalidCouponAmount,
    Forbidden,
    InvalidTransition,
    InvalidAmount,
    Conflict,
    Storage,
}

impl ErrorKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EmptyCart => "empty_cart",
            ErrorKind::MissingAddress => "missing_address",
            ErrorKind::InvalidQuantity => "invalid_quantity",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::ReturnWindowExpired => "return_window_expired",
            ErrorKind::InvalidCouponAmount => "invalid_coupon_amount",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidAmount => "invalid_amount",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Storage => "storage",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An error occurred in the cart aggregate.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An error occurred in the order aggregate.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {id}")]
    NotFound {
        aggregate_type: &'static str,
        id: String,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<PricingError> for DomainError {
    fn from(e: PricingError) -> Self {
        DomainError::Cart(CartError::Pricing(e))
    }
}

impl DomainError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Store(err) => store_kind(err),
            DomainError::Cart(err) => err.kind(),
            DomainError::Order(err) => err.kind(),
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Serialization(_) => ErrorKind::Storage,
        }
    }
}

fn store_kind(err: &StoreError) -> ErrorKind {
    match err {
        StoreError::ConcurrencyConflict { .. } | StoreError::DuplicateKey { .. } => {
            ErrorKind::Conflict
        }
        StoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
        StoreError::UnknownMedicine(_) => ErrorKind::NotFound,
        StoreError::Database(_) | StoreError::Migration(_) | StoreError::Serialization(_) => {
            ErrorKind::Storage
        }
    }
}
