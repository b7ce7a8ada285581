//! Order status state machine.

use serde::{Deserialize, Serialize};

/// The status of an order in its lifecycle.
///
/// Status transitions:
/// ```text
/// Placed ──► Confirmed ──► PrescriptionPending ⇄ PrescriptionVerified
///   │            │                                      │
///   │            └──────────────► Processing ◄──────────┘
///   │                                 │
///   └─► PrescriptionPending           ▼
///                       Packed ──► ReadyForPickup ──► OutForDelivery ──► Delivered ──► Returned
///
/// any status before Delivered ──► Cancelled
/// Cancelled | Returned ──► Refunded (full refund settled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order was created from a cart.
    #[default]
    Placed,

    /// Payment or COD acceptance confirmed.
    Confirmed,

    /// Waiting for a pharmacist to check the prescription.
    PrescriptionPending,

    /// Prescription was checked and accepted.
    PrescriptionVerified,

    /// Order is being picked.
    Processing,

    Packed,

    ReadyForPickup,

    /// A delivery partner is on the way.
    OutForDelivery,

    /// Handed over to the customer.
    Delivered,

    /// Order was cancelled before delivery.
    Cancelled,

    /// Delivered order was sent back within the return window.
    Returned,

    /// Payment of a cancelled or returned order was fully refunded.
    Refunded,
}

impl OrderStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [OrderStatus; 12] = [
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::PrescriptionPending,
        OrderStatus::PrescriptionVerified,
        OrderStatus::Processing,
        OrderStatus::Packed,
        OrderStatus::ReadyForPickup,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Returned,
        OrderStatus::Refunded,
    ];

    /// Returns the statuses reachable from this one.
    pub fn allowed_transitions(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;

        match self {
            Placed => &[Confirmed, PrescriptionPending, Cancelled],
            Confirmed => &[PrescriptionPending, Processing, Cancelled],
            PrescriptionPending => &[PrescriptionVerified, Cancelled],
            PrescriptionVerified => &[PrescriptionPending, Processing, Cancelled],
            Processing => &[Packed, Cancelled],
            Packed => &[ReadyForPickup, Cancelled],
            ReadyForPickup => &[OutForDelivery, Cancelled],
            OutForDelivery => &[Delivered, Cancelled],
            Delivered => &[Returned],
            Cancelled | Returned => &[Refunded],
            Refunded => &[],
        }
    }

    /// Returns true if moving to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_be_cancelled(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Returns true once the order can no longer move through fulfillment.
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Returned
                | OrderStatus::Refunded
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// Returns the status name as shown to customers.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "Placed",
            OrderStatus::Confirmed => "Confirmed",
            OrderStatus::PrescriptionPending => "Prescription Pending",
            OrderStatus::PrescriptionVerified => "Prescription Verified",
            OrderStatus::Processing => "Processing",
            OrderStatus::Packed => "Packed",
            OrderStatus::ReadyForPickup => "Ready for Pickup",
            OrderStatus::OutForDelivery => "Out for Delivery",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
            OrderStatus::Returned => "Returned",
            OrderStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
