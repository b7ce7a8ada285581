//! Order domain events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::aggregate::DomainEvent;

use super::{Actor, DeliveryOtp, DeliveryPartner, OrderStatus, PaymentStatus};

/// Events that can occur on an order aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    /// Order moved along the fulfillment path.
    StatusChanged(StatusChangedData),

    /// A delivery OTP was issued because none existed.
    DeliveryOtpIssued(DeliveryOtpIssuedData),

    /// A delivery partner was assigned together with a fresh OTP.
    DeliveryPartnerAssigned(DeliveryPartnerAssignedData),

    /// Order was handed over to the customer.
    Delivered(DeliveredData),

    /// Order was cancelled.
    Cancelled(CancelledData),

    /// Customer sent a delivered order back.
    ReturnRequested(ReturnRequestedData),

    /// Payment provider or courier confirmed the money.
    PaymentConfirmed(PaymentConfirmedData),

    /// Part or all of the payment was refunded.
    RefundProcessed(RefundProcessedData),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::StatusChanged(_) => "StatusChanged",
            OrderEvent::DeliveryOtpIssued(_) => "DeliveryOtpIssued",
            OrderEvent::DeliveryPartnerAssigned(_) => "DeliveryPartnerAssigned",
            OrderEvent::Delivered(_) => "Delivered",
            OrderEvent::Cancelled(_) => "Cancelled",
            OrderEvent::ReturnRequested(_) => "ReturnRequested",
            OrderEvent::PaymentConfirmed(_) => "PaymentConfirmed",
            OrderEvent::RefundProcessed(_) => "RefundProcessed",
        }
    }
}

impl OrderEvent {
    /// Returns the status this event moves the order into, if any.
    pub fn status(&self) -> Option<OrderStatus> {
        match self {
            OrderEvent::StatusChanged(data) => Some(data.status),
            OrderEvent::Delivered(_) => Some(OrderStatus::Delivered),
            OrderEvent::Cancelled(_) => Some(OrderStatus::Cancelled),
            OrderEvent::ReturnRequested(_) => Some(OrderStatus::Returned),
            _ => None,
        }
    }

    /// Returns the remarks recorded with a status change.
    pub fn remarks(&self) -> Option<&str> {
        match self {
            OrderEvent::StatusChanged(data) => data.remarks.as_deref(),
            OrderEvent::Cancelled(data) => Some(&data.reason),
            OrderEvent::ReturnRequested(data) => Some(&data.reason),
            _ => None,
        }
    }

    /// Returns when the event happened.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::StatusChanged(data) => data.timestamp,
            OrderEvent::DeliveryOtpIssued(data) => data.issued_at,
            OrderEvent::DeliveryPartnerAssigned(data) => data.assigned_at,
            OrderEvent::Delivered(data) => data.delivered_at,
            OrderEvent::Cancelled(data) => data.cancelled_at,
            OrderEvent::ReturnRequested(data) => data.requested_at,
            OrderEvent::PaymentConfirmed(data) => data.paid_at,
            OrderEvent::RefundProcessed(data) => data.processed_at,
        }
    }
}

/// Data for StatusChanged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChangedData {
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub remarks: Option<String>,
    pub location: Option<String>,
    pub actor: Actor,
}

/// Data for DeliveryOtpIssued event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryOtpIssuedData {
    pub otp: DeliveryOtp,
    pub issued_at: DateTime<Utc>,
}

/// Data for DeliveryPartnerAssigned event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPartnerAssignedData {
    pub partner: DeliveryPartner,
    pub otp: DeliveryOtp,
    pub assigned_at: DateTime<Utc>,
}

/// Data for Delivered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveredData {
    pub delivered_by: String,
    pub received_by: Option<String>,
    pub images: Vec<String>,
    pub delivered_at: DateTime<Utc>,
    pub actor: Actor,
}

/// Data for Cancelled event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelledData {
    pub reason: String,
    pub cancelled_by: Actor,
    pub refund_amount: Money,
    pub cancelled_at: DateTime<Utc>,
}

/// Data for ReturnRequested event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequestedData {
    pub reason: String,
    pub requested_by: Actor,
    pub requested_at: DateTime<Utc>,
}

/// Data for PaymentConfirmed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmedData {
    pub transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

/// Data for RefundProcessed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundProcessedData {
    /// Amount refunded by this operation.
    pub amount: Money,
    /// Amount refunded across all operations.
    pub total_refunded: Money,
    pub payment_status: PaymentStatus,
    pub processed_at: DateTime<Utc>,
}
