//! Domain layer for the medicine order backend.
//!
//! This crate provides the core domain abstractions including:
//! - `Money` and the stateless `PricingEngine`
//! - The per-user `Cart` aggregate and `CartService`
//! - The event-sourced `Order` aggregate with its status state machine
//! - `OrderFactory` for turning carts into orders
//! - `InventoryAdjuster` for stock changes tied to orders

pub mod aggregate;
pub mod cart;
pub mod error;
pub mod inventory;
pub mod money;
pub mod order;
pub mod pricing;
pub mod repository;

pub use aggregate::{Aggregate, DomainEvent, EventSourced};
pub use cart::{
    Cart, CartError, CartLimits, CartLineItem, CartPolicy, CartService, CartSnapshot,
    MedicineSnapshot,
};
pub use error::{DomainError, ErrorKind};
pub use inventory::{
    AdjustmentMode, AdjustmentReason, AdjustmentReport, AppliedAdjustment, FailedAdjustment,
    InventoryAdjuster,
};
pub use money::Money;
pub use order::{
    Actor, AddressSnapshot, CheckoutRequest, DeliveryPartner, FactoryConfig, Order, OrderError,
    OrderEvent, OrderFactory, OrderLineItem, OrderService, OrderStatus, PaymentIntent,
    PaymentMethod, PaymentStatus,
};
pub use pricing::{Coupon, DiscountType, PriceBreakdown, PricingConfig, PricingEngine};
pub use repository::{CommandResult, Repository};
