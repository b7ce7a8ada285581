//! Order commands.
//!
//! Commands carry the caller's intent; the aggregate validates them against
//! its current state before any event is produced.

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::Money;

use super::{Actor, DeliveryPartner, OrderStatus};

/// Command to move an order to a new status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    #[serde(default)]
    pub remarks: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub actor: Actor,
}

/// Command to assign (or reassign) the delivery partner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignDeliveryPartner {
    pub order_id: OrderId,
    pub partner: DeliveryPartner,
}

/// Command to record the handoff to the customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkDelivered {
    pub order_id: OrderId,
    pub delivered_by: String,
    #[serde(default)]
    pub received_by: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    /// OTP read out by the customer; checked when present.
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub actor: Actor,
}

/// Command to cancel an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub reason: String,
    #[serde(default)]
    pub cancelled_by: Actor,
    /// Defaults to the paid amount.
    #[serde(default)]
    pub refund_amount: Option<Money>,
}

/// Command to return a delivered order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestReturn {
    pub order_id: OrderId,
    pub reason: String,
    #[serde(default)]
    pub requested_by: Actor,
}

/// Payment provider callback reporting a settled payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPayment {
    pub order_id: OrderId,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

/// Command to refund part or all of the paid amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRefund {
    pub order_id: OrderId,
    pub amount: Money,
}
