//! Turning a cart snapshot into a placed order.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::cart::CartSnapshot;
use crate::pricing::PricingEngine;

use super::aggregate::PlacedOrder;
use super::{AddressSnapshot, Order, OrderError, OrderLineItem, Payment, PaymentMethod};

/// Configuration for order creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactoryConfig {
    /// Prefix of every order number.
    pub order_number_prefix: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            order_number_prefix: "MED".to_string(),
        }
    }
}

/// Produces human-facing order numbers.
///
/// Numbers are for display and lookup; order identity is the `OrderId`, and
/// the store enforces uniqueness of numbers.
pub trait OrderNumberGenerator: Send + Sync {
    /// Returns the next order number.
    fn next_number(&self, prefix: &str, now: DateTime<Utc>) -> String;
}

/// Prefix, the last 8 digits of the Unix time in milliseconds, then a
/// 3-digit in-process sequence.
#[derive(Debug, Default)]
pub struct SequentialOrderNumbers {
    sequence: AtomicU32,
}

impl SequentialOrderNumbers {
    /// Creates a generator starting at sequence 0.
    pub fn new() -> Self {
        Self::default()
    }
}

impl OrderNumberGenerator for SequentialOrderNumbers {
    fn next_number(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let time_part = now.timestamp_millis().rem_euclid(100_000_000);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) % 1000;
        format!("{prefix}{time_part:08}{sequence:03}")
    }
}

/// How the customer intends to pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub method: PaymentMethod,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl PaymentIntent {
    /// Cash on delivery.
    pub fn cod() -> Self {
        Self {
            method: PaymentMethod::Cod,
            transaction_id: None,
        }
    }

    /// Online payment with the provider's transaction reference.
    pub fn online(transaction_id: impl Into<String>) -> Self {
        Self {
            method: PaymentMethod::Online,
            transaction_id: Some(transaction_id.into()),
        }
    }
}

/// Everything checkout needs besides the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub address: Option<AddressSnapshot>,
    pub payment: PaymentIntent,
    /// Customer asks for pharmacist review even without Rx items.
    #[serde(default)]
    pub prescription_required: bool,
    #[serde(default)]
    pub prescription_refs: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Builds placed orders from cart snapshots.
///
/// The factory does not touch stock; the caller adjusts inventory for the
/// returned order.
#[derive(Clone)]
pub struct OrderFactory {
    config: FactoryConfig,
    pricing: PricingEngine,
    numbers: Arc<dyn OrderNumberGenerator>,
}

impl OrderFactory {
    /// Creates a factory using the in-process sequential number generator.
    pub fn new(config: FactoryConfig, pricing: PricingEngine) -> Self {
        Self::with_numbers(config, pricing, Arc::new(SequentialOrderNumbers::new()))
    }

    /// Creates a factory with a custom number generator.
    pub fn with_numbers(
        config: FactoryConfig,
        pricing: PricingEngine,
        numbers: Arc<dyn OrderNumberGenerator>,
    ) -> Self {
        Self {
            config,
            pricing,
            numbers,
        }
    }

    /// Returns the factory configuration.
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Creates a placed order from a cart snapshot.
    ///
    /// Pricing is copied from the snapshot when present and recomputed from
    /// the items otherwise.
    pub fn create_order(
        &self,
        cart: &CartSnapshot,
        request: CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        if cart.items.is_empty() {
            return Err(OrderError::EmptyCart);
        }
        let address = request.address.ok_or(OrderError::MissingAddress)?;

        let items: Vec<OrderLineItem> = cart.items.iter().map(OrderLineItem::from).collect();

        let pricing = match cart.pricing {
            Some(pricing) => pricing,
            None => self
                .pricing
                .price(&items, cart.coupon.as_ref(), cart.reward_points),
        };

        let requires_prescription = request.prescription_required
            || cart.requires_prescription
            || items.iter().any(|i| i.requires_prescription);

        let order_number = self
            .numbers
            .next_number(&self.config.order_number_prefix, now);

        Ok(Order::place(PlacedOrder {
            id: OrderId::new(),
            order_number,
            user_id: cart.user_id,
            items,
            address,
            payment: Payment::pending(request.payment.method, request.payment.transaction_id),
            pricing,
            requires_prescription,
            prescription_refs: request.prescription_refs,
            notes: request.notes,
            placed_at: now,
        }))
    }
}

impl std::fmt::Debug for OrderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderFactory")
            .field("config", &self.config)
            .field("pricing", &self.pricing)
            .finish_non_exhaustive()
    }
}
