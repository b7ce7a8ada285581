//! Cart and order pricing.
//!
//! The engine is a pure function of line items, an optional coupon, a reward
//! points request and [`PricingConfig`]. It never mutates its inputs, so
//! recomputing on unchanged input always yields the same breakdown.

mod config;
mod coupon;
mod engine;

pub use config::PricingConfig;
pub use coupon::{Coupon, DiscountType};
pub use engine::{PriceBreakdown, PricedItem, PricingEngine};

use thiserror::Error;

/// Errors raised while validating pricing input.
#[derive(Debug, Error)]
pub enum PricingError {
    /// Caller-supplied coupon data is inconsistent.
    #[error("Invalid coupon amount for {code}: {reason}")]
    InvalidCouponAmount { code: String, reason: &'static str },
}
