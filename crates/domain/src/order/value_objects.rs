//! Value objects for the order domain.

use chrono::{DateTime, Utc};
use common::{MedicineId, UserId};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Money;
use crate::cart::CartLineItem;
use crate::pricing::PricedItem;

/// A medicine frozen into an order at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub medicine_id: MedicineId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub unit_mrp: Money,
    pub discount_percent: Decimal,
    pub requires_prescription: bool,
    pub batch_number: Option<String>,
}

impl OrderLineItem {
    /// Returns quantity * unit price.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

impl From<&CartLineItem> for OrderLineItem {
    fn from(item: &CartLineItem) -> Self {
        Self {
            medicine_id: item.medicine_id.clone(),
            name: item.name.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            unit_mrp: item.unit_mrp,
            discount_percent: item.discount_percent,
            requires_prescription: item.requires_prescription,
            batch_number: item.batch_number.clone(),
        }
    }
}

impl PricedItem for OrderLineItem {
    fn unit_price(&self) -> Money {
        self.unit_price
    }

    fn unit_mrp(&self) -> Money {
        self.unit_mrp
    }

    fn quantity(&self) -> u32 {
        self.quantity
    }
}

/// Delivery address copied into the order; later edits never touch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSnapshot {
    pub contact_person: String,
    pub phone_number: String,
    pub lines: Vec<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    #[serde(default = "default_country")]
    pub country: String,
}

fn default_country() -> String {
    "India".to_string()
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery.
    Cod,
    Online,
    Wallet,
}

/// Settlement state of an order's payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Completed,
    Failed,
    PartiallyRefunded,
    Refunded,
}

impl PaymentStatus {
    /// Returns true once money has been received.
    pub fn is_paid(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded
        )
    }
}

/// Payment block of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Total refunded so far.
    pub refund_amount: Money,
}

impl Payment {
    /// Creates a pending payment.
    pub fn pending(method: PaymentMethod, transaction_id: Option<String>) -> Self {
        Self {
            method,
            status: PaymentStatus::Pending,
            transaction_id,
            paid_at: None,
            refund_amount: Money::zero(),
        }
    }
}

/// A 4-digit code the customer reads out at handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryOtp(String);

impl DeliveryOtp {
    /// Generates a random code between 1000 and 9999.
    pub fn generate() -> Self {
        let code: u16 = rand::thread_rng().gen_range(1000..=9999);
        Self(code.to_string())
    }

    /// Returns the code.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares a presented code with this one.
    pub fn matches(&self, presented: &str) -> bool {
        self.0 == presented.trim()
    }
}

impl std::fmt::Display for DeliveryOtp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeliveryOtp {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

/// Who delivers the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryPartner {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub vehicle_number: Option<String>,
    #[serde(default)]
    pub partner_id: Option<String>,
}

/// Delivery block of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliveryInfo {
    pub partner: Option<DeliveryPartner>,
    pub otp: Option<DeliveryOtp>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub delivered_by: Option<String>,
    pub received_by: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Who handed the parcel over, and to whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handoff {
    pub delivered_by: String,
    #[serde(default)]
    pub received_by: Option<String>,
    /// Proof-of-delivery image references.
    #[serde(default)]
    pub images: Vec<String>,
}

/// Who performed an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    Customer(UserId),
    Admin(String),
    DeliveryPartner(String),
    #[default]
    System,
}

impl std::fmt::Display for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Customer(id) => write!(f, "customer:{id}"),
            Actor::Admin(id) => write!(f, "admin:{id}"),
            Actor::DeliveryPartner(id) => write!(f, "delivery_partner:{id}"),
            Actor::System => write!(f, "system"),
        }
    }
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: super::OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub remarks: Option<String>,
    pub location: Option<String>,
    pub actor: Option<Actor>,
}

/// Cancellation block of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    pub cancelled_by: Actor,
    pub cancelled_at: DateTime<Utc>,
    pub refund_amount: Money,
}

/// Return block of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub reason: String,
    pub requested_by: Actor,
    pub requested_at: DateTime<Utc>,
}
