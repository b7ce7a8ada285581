//! Order aggregate and related types.

mod aggregate;
mod commands;
mod events;
mod factory;
mod service;
mod state;
mod value_objects;

pub use aggregate::{Order, RETURN_WINDOW_DAYS};
pub use commands::*;
pub use events::{
    CancelledData, DeliveredData, DeliveryOtpIssuedData, DeliveryPartnerAssignedData, OrderEvent,
    PaymentConfirmedData, RefundProcessedData, ReturnRequestedData, StatusChangedData,
};
pub use factory::{
    CheckoutRequest, FactoryConfig, OrderFactory, OrderNumberGenerator, PaymentIntent,
    SequentialOrderNumbers,
};
pub use service::OrderService;
pub use state::OrderStatus;
pub use value_objects::{
    Actor, AddressSnapshot, Cancellation, DeliveryInfo, DeliveryOtp, DeliveryPartner, Handoff,
    OrderLineItem, Payment, PaymentMethod, PaymentStatus, ReturnRequest, StatusEntry,
};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::Money;
use crate::error::ErrorKind;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout was attempted with no line items.
    #[error("Cannot create an order from an empty cart")]
    EmptyCart,

    /// Checkout was attempted without a delivery address.
    #[error("A delivery address is required")]
    MissingAddress,

    /// The status graph does not allow this move.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Prescription orders must be verified before processing.
    #[error("Prescription must be verified before processing")]
    PrescriptionRequired,

    /// Delivery details can no longer change.
    #[error("Order is {status}; delivery details can no longer change")]
    DeliveryClosed { status: OrderStatus },

    /// Presented OTP does not match the issued one.
    #[error("Invalid delivery OTP")]
    InvalidDeliveryOtp,

    /// Return requested too long after delivery.
    #[error("Return window expired: delivered at {delivered_at}, requested at {requested_at}")]
    ReturnWindowExpired {
        delivered_at: DateTime<Utc>,
        requested_at: DateTime<Utc>,
    },

    /// Monetary amount is not acceptable.
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: Money, reason: &'static str },

    /// Actor is neither the order owner nor staff.
    #[error("{actor} may not act on this order")]
    Forbidden { actor: Actor },
}

impl OrderError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::EmptyCart => ErrorKind::EmptyCart,
            OrderError::MissingAddress => ErrorKind::MissingAddress,
            OrderError::InvalidTransition { .. }
            | OrderError::PrescriptionRequired
            | OrderError::DeliveryClosed { .. }
            | OrderError::InvalidDeliveryOtp => ErrorKind::InvalidTransition,
            OrderError::ReturnWindowExpired { .. } => ErrorKind::ReturnWindowExpired,
            OrderError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            OrderError::Forbidden { .. } => ErrorKind::Forbidden,
        }
    }
}
