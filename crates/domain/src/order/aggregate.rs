//! Order aggregate implementation.

use chrono::{DateTime, Duration, Utc};
use common::{MedicineId, OrderId, UserId};
use serde::{Deserialize, Serialize};
use store::Version;

use crate::Money;
use crate::aggregate::{Aggregate, EventSourced};
use crate::pricing::PriceBreakdown;

use super::events::{
    CancelledData, DeliveredData, DeliveryOtpIssuedData, DeliveryPartnerAssignedData,
    PaymentConfirmedData, RefundProcessedData, ReturnRequestedData, StatusChangedData,
};
use super::{
    Actor, AddressSnapshot, Cancellation, DeliveryInfo, DeliveryOtp, DeliveryPartner, Handoff,
    OrderError, OrderEvent, OrderLineItem, OrderStatus, Payment, PaymentMethod, PaymentStatus,
    ReturnRequest, StatusEntry,
};

/// Days after delivery during which a return is accepted.
pub const RETURN_WINDOW_DAYS: i64 = 7;

/// Everything the factory decides when an order is placed.
pub(super) struct PlacedOrder {
    pub id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub items: Vec<OrderLineItem>,
    pub address: AddressSnapshot,
    pub payment: Payment,
    pub pricing: PriceBreakdown,
    pub requires_prescription: bool,
    pub prescription_refs: Vec<String>,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// Items, address and pricing are frozen at checkout. Everything after that
/// happens through commands that return events, which `apply` folds into
/// the status, history, delivery and payment blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,

    #[serde(skip)]
    version: Version,

    /// Human-facing number, unique across orders.
    order_number: String,

    user_id: UserId,

    items: Vec<OrderLineItem>,

    address: AddressSnapshot,

    payment: Payment,

    pricing: PriceBreakdown,

    status: OrderStatus,

    /// Append-only; the last entry always carries `status`.
    status_history: Vec<StatusEntry>,

    delivery: DeliveryInfo,

    cancellation: Option<Cancellation>,

    return_request: Option<ReturnRequest>,

    requires_prescription: bool,

    #[serde(default)]
    prescription_refs: Vec<String>,

    /// Set once the order has reached PrescriptionVerified.
    #[serde(default)]
    prescription_verified: bool,

    notes: Option<String>,

    /// Items whose stock could not be taken at checkout.
    #[serde(default)]
    stock_shortfall: Vec<MedicineId>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

impl Aggregate for Order {
    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn collection() -> &'static str {
        "orders"
    }

    fn key(&self) -> String {
        self.id.to_string()
    }

    fn owner(&self) -> Option<String> {
        Some(self.user_id.to_string())
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }
}

impl EventSourced for Order {
    type Event = OrderEvent;
    type Error = OrderError;

    fn apply(&mut self, event: Self::Event) {
        let occurred_at = event.occurred_at();

        match event {
            OrderEvent::StatusChanged(data) => {
                if data.status == OrderStatus::PrescriptionVerified {
                    self.prescription_verified = true;
                }
                self.push_status(
                    data.status,
                    data.timestamp,
                    data.remarks,
                    data.location,
                    data.actor,
                );
            }
            OrderEvent::DeliveryOtpIssued(data) => {
                self.delivery.otp = Some(data.otp);
            }
            OrderEvent::DeliveryPartnerAssigned(data) => {
                self.delivery.partner = Some(data.partner);
                self.delivery.otp = Some(data.otp);
            }
            OrderEvent::Delivered(data) => {
                self.delivery.actual_delivery_time = Some(data.delivered_at);
                self.delivery.delivered_by = Some(data.delivered_by);
                self.delivery.received_by = data.received_by;
                self.delivery.images = data.images;
                self.push_status(
                    OrderStatus::Delivered,
                    data.delivered_at,
                    Some("Order delivered".to_string()),
                    None,
                    data.actor,
                );
            }
            OrderEvent::Cancelled(data) => {
                self.push_status(
                    OrderStatus::Cancelled,
                    data.cancelled_at,
                    Some(data.reason.clone()),
                    None,
                    data.cancelled_by.clone(),
                );
                self.cancellation = Some(Cancellation {
                    reason: data.reason,
                    cancelled_by: data.cancelled_by,
                    cancelled_at: data.cancelled_at,
                    refund_amount: data.refund_amount,
                });
            }
            OrderEvent::ReturnRequested(data) => {
                self.push_status(
                    OrderStatus::Returned,
                    data.requested_at,
                    Some(data.reason.clone()),
                    None,
                    data.requested_by.clone(),
                );
                self.return_request = Some(ReturnRequest {
                    reason: data.reason,
                    requested_by: data.requested_by,
                    requested_at: data.requested_at,
                });
            }
            OrderEvent::PaymentConfirmed(data) => {
                self.payment.status = PaymentStatus::Completed;
                self.payment.paid_at = Some(data.paid_at);
                if data.transaction_id.is_some() {
                    self.payment.transaction_id = data.transaction_id;
                }
            }
            OrderEvent::RefundProcessed(data) => {
                self.payment.refund_amount = data.total_refunded;
                self.payment.status = data.payment_status;
            }
        }

        self.updated_at = self.updated_at.max(occurred_at);
    }
}

// Query methods
impl Order {
    pub(super) fn place(placed: PlacedOrder) -> Self {
        let history = vec![StatusEntry {
            status: OrderStatus::Placed,
            timestamp: placed.placed_at,
            remarks: Some("Order placed".to_string()),
            location: None,
            actor: Some(Actor::Customer(placed.user_id)),
        }];

        Self {
            id: placed.id,
            version: Version::initial(),
            order_number: placed.order_number,
            user_id: placed.user_id,
            items: placed.items,
            address: placed.address,
            payment: placed.payment,
            pricing: placed.pricing,
            status: OrderStatus::Placed,
            status_history: history,
            delivery: DeliveryInfo::default(),
            cancellation: None,
            return_request: None,
            requires_prescription: placed.requires_prescription,
            prescription_refs: placed.prescription_refs,
            prescription_verified: false,
            notes: placed.notes,
            stock_shortfall: Vec::new(),
            created_at: placed.placed_at,
            updated_at: placed.placed_at,
        }
    }

    /// Returns the order ID.
    pub fn id(&self) -> OrderId {
        self.id
    }

    /// Returns the human-facing order number.
    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    /// Returns the owning user.
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the frozen line items.
    pub fn items(&self) -> &[OrderLineItem] {
        &self.items
    }

    /// Returns the total number of units.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Returns the delivery address snapshot.
    pub fn address(&self) -> &AddressSnapshot {
        &self.address
    }

    /// Returns the payment block.
    pub fn payment(&self) -> &Payment {
        &self.payment
    }

    /// Returns the frozen pricing.
    pub fn pricing(&self) -> &PriceBreakdown {
        &self.pricing
    }

    /// Returns the current status.
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Returns the status history, oldest first.
    pub fn status_history(&self) -> &[StatusEntry] {
        &self.status_history
    }

    /// Returns the delivery block.
    pub fn delivery(&self) -> &DeliveryInfo {
        &self.delivery
    }

    /// Returns the delivery OTP, if one was issued.
    pub fn delivery_otp(&self) -> Option<&DeliveryOtp> {
        self.delivery.otp.as_ref()
    }

    /// Returns the cancellation block.
    pub fn cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    /// Returns the return block.
    pub fn return_request(&self) -> Option<&ReturnRequest> {
        self.return_request.as_ref()
    }

    /// Returns true if any item needs a prescription or the customer asked for review.
    pub fn requires_prescription(&self) -> bool {
        self.requires_prescription
    }

    /// Returns references to uploaded prescriptions.
    pub fn prescription_refs(&self) -> &[String] {
        &self.prescription_refs
    }

    /// Returns true once the prescription has been verified.
    pub fn prescription_verified(&self) -> bool {
        self.prescription_verified
    }

    /// Returns the customer's notes.
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Returns the items whose stock was not taken at checkout.
    pub fn stock_shortfall(&self) -> &[MedicineId] {
        &self.stock_shortfall
    }

    /// Returns the items whose stock was taken at checkout.
    pub fn restockable_items(&self) -> impl Iterator<Item = &OrderLineItem> {
        self.items
            .iter()
            .filter(|item| !self.stock_shortfall.contains(&item.medicine_id))
    }

    /// Returns when the order was placed.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the order last changed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the amount actually received.
    ///
    /// This is the frozen final amount once payment settled, zero before.
    pub fn paid_amount(&self) -> Money {
        if self.payment.status.is_paid() {
            self.pricing.final_amount
        } else {
            Money::zero()
        }
    }

    /// Returns true if a return would be accepted at `now`.
    pub fn is_returnable(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatus::Delivered
            && self
                .delivery
                .actual_delivery_time
                .is_some_and(|at| now - at <= Duration::days(RETURN_WINDOW_DAYS))
    }

    /// Checks that `actor` may act on this order.
    ///
    /// Customers may only touch their own orders; staff and system actors
    /// may touch any.
    pub fn authorize(&self, actor: &Actor) -> Result<(), OrderError> {
        match actor {
            Actor::Customer(user_id) if *user_id != self.user_id => Err(OrderError::Forbidden {
                actor: actor.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Checks that `actor` may drive fulfillment. Customers never may.
    fn ensure_staff(actor: &Actor) -> Result<(), OrderError> {
        match actor {
            Actor::Customer(_) => Err(OrderError::Forbidden {
                actor: actor.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Records items whose stock could not be taken at checkout.
    ///
    /// Only meaningful before the order is first saved.
    pub fn record_stock_shortfall(&mut self, medicine_ids: Vec<MedicineId>) {
        self.stock_shortfall = medicine_ids;
    }
}

// Command methods (return events)
impl Order {
    /// Moves the order to `status`.
    ///
    /// Cancellation, delivery and return have their own commands and are
    /// delegated to them. Only customers' own cancellations and returns
    /// pass through; every other move is for staff. Entering
    /// OutForDelivery issues an OTP if none exists yet.
    pub fn update_status(
        &self,
        status: OrderStatus,
        remarks: Option<String>,
        location: Option<String>,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        match status {
            OrderStatus::Cancelled => {
                let reason = remarks.unwrap_or_else(|| "Cancelled".to_string());
                return self.cancel(reason, actor, None, now);
            }
            OrderStatus::Delivered => {
                let handoff = Handoff {
                    delivered_by: actor.to_string(),
                    received_by: None,
                    images: Vec::new(),
                };
                return self.mark_delivered(handoff, None, actor, now);
            }
            OrderStatus::Returned => {
                let reason = remarks.unwrap_or_else(|| "Returned".to_string());
                return self.request_return(reason, actor, now);
            }
            OrderStatus::Refunded => {
                // Only a settled refund moves an order to Refunded.
                return Err(self.invalid_transition(status));
            }
            _ => {}
        }

        Self::ensure_staff(&actor)?;
        self.ensure_transition(status)?;

        if status == OrderStatus::Processing
            && self.requires_prescription
            && !self.prescription_verified
        {
            return Err(OrderError::PrescriptionRequired);
        }

        let timestamp = self.next_timestamp(now);
        let mut events = vec![OrderEvent::StatusChanged(StatusChangedData {
            status,
            timestamp,
            remarks,
            location,
            actor,
        })];

        if status == OrderStatus::OutForDelivery {
            events.extend(self.issue_otp_if_missing(timestamp));
        }

        Ok(events)
    }

    /// Issues a delivery OTP unless one already exists.
    pub fn ensure_delivery_otp(&self, now: DateTime<Utc>) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_delivery_open()?;
        Ok(self.issue_otp_if_missing(self.next_timestamp(now)))
    }

    /// Assigns a delivery partner and always issues a fresh OTP.
    pub fn assign_delivery_partner(
        &self,
        partner: DeliveryPartner,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.ensure_delivery_open()?;

        Ok(vec![OrderEvent::DeliveryPartnerAssigned(
            DeliveryPartnerAssignedData {
                partner,
                otp: DeliveryOtp::generate(),
                assigned_at: self.next_timestamp(now),
            },
        )])
    }

    /// Records the handoff to the customer.
    ///
    /// When `otp` is given it must match the issued code. A pending cash on
    /// delivery payment is settled at handoff. Stock is not touched.
    /// Customers cannot mark their own orders delivered.
    pub fn mark_delivered(
        &self,
        handoff: Handoff,
        otp: Option<&str>,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        Self::ensure_staff(&actor)?;
        self.ensure_transition(OrderStatus::Delivered)?;

        if let Some(presented) = otp {
            match &self.delivery.otp {
                Some(issued) if issued.matches(presented) => {}
                _ => return Err(OrderError::InvalidDeliveryOtp),
            }
        }

        let delivered_at = self.next_timestamp(now);
        let mut events = Vec::with_capacity(2);

        if self.payment.method == PaymentMethod::Cod
            && self.payment.status == PaymentStatus::Pending
        {
            events.push(OrderEvent::PaymentConfirmed(PaymentConfirmedData {
                transaction_id: None,
                paid_at: delivered_at,
            }));
        }

        events.push(OrderEvent::Delivered(DeliveredData {
            delivered_by: handoff.delivered_by,
            received_by: handoff.received_by,
            images: handoff.images,
            delivered_at,
            actor,
        }));

        Ok(events)
    }

    /// Cancels the order.
    ///
    /// The refund amount defaults to the paid amount. Restocking is left to
    /// the caller.
    pub fn cancel(
        &self,
        reason: String,
        cancelled_by: Actor,
        refund_amount: Option<Money>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.authorize(&cancelled_by)?;

        if !self.status.can_be_cancelled() {
            return Err(self.invalid_transition(OrderStatus::Cancelled));
        }

        let paid = self.paid_amount();
        let refund_amount = refund_amount.unwrap_or(paid);

        if refund_amount.is_negative() {
            return Err(OrderError::InvalidAmount {
                amount: refund_amount,
                reason: "refund must not be negative",
            });
        }
        if refund_amount > paid {
            return Err(OrderError::InvalidAmount {
                amount: refund_amount,
                reason: "refund exceeds paid amount",
            });
        }

        Ok(vec![OrderEvent::Cancelled(CancelledData {
            reason,
            cancelled_by,
            refund_amount,
            cancelled_at: self.next_timestamp(now),
        })])
    }

    /// Returns a delivered order within the return window.
    pub fn request_return(
        &self,
        reason: String,
        requested_by: Actor,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        self.authorize(&requested_by)?;

        let delivered_at = match (self.status, self.delivery.actual_delivery_time) {
            (OrderStatus::Delivered, Some(at)) => at,
            _ => return Err(self.invalid_transition(OrderStatus::Returned)),
        };

        if now - delivered_at > Duration::days(RETURN_WINDOW_DAYS) {
            return Err(OrderError::ReturnWindowExpired {
                delivered_at,
                requested_at: now,
            });
        }

        Ok(vec![OrderEvent::ReturnRequested(ReturnRequestedData {
            reason,
            requested_by,
            requested_at: self.next_timestamp(now),
        })])
    }

    /// Records a settled payment.
    ///
    /// A placed order moves to Confirmed. Repeated callbacks are no-ops.
    pub fn confirm_payment(
        &self,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if self.payment.status.is_paid() {
            return Ok(vec![]);
        }

        let paid_at = self.next_timestamp(now);
        let mut events = vec![OrderEvent::PaymentConfirmed(PaymentConfirmedData {
            transaction_id,
            paid_at,
        })];

        if self.status == OrderStatus::Placed {
            events.push(OrderEvent::StatusChanged(StatusChangedData {
                status: OrderStatus::Confirmed,
                timestamp: paid_at,
                remarks: Some("Payment confirmed".to_string()),
                location: None,
                actor: Actor::System,
            }));
        }

        Ok(events)
    }

    /// Refunds part or all of the paid amount.
    ///
    /// Refunds accumulate; payment becomes Refunded once the total reaches
    /// the paid amount. A fully refunded cancelled or returned order moves
    /// to Refunded.
    pub fn process_refund(
        &self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount {
                amount,
                reason: "refund must be positive",
            });
        }

        let paid = self.paid_amount();
        if paid.is_zero() {
            return Err(OrderError::InvalidAmount {
                amount,
                reason: "order has no settled payment",
            });
        }

        let total_refunded = self.payment.refund_amount + amount;
        if total_refunded > paid {
            return Err(OrderError::InvalidAmount {
                amount,
                reason: "refund exceeds remaining paid amount",
            });
        }

        let payment_status = if total_refunded >= paid {
            PaymentStatus::Refunded
        } else {
            PaymentStatus::PartiallyRefunded
        };

        let processed_at = self.next_timestamp(now);
        let mut events = vec![OrderEvent::RefundProcessed(RefundProcessedData {
            amount,
            total_refunded,
            payment_status,
            processed_at,
        })];

        if payment_status == PaymentStatus::Refunded
            && self.status.can_transition_to(OrderStatus::Refunded)
        {
            events.push(OrderEvent::StatusChanged(StatusChangedData {
                status: OrderStatus::Refunded,
                timestamp: processed_at,
                remarks: Some(format!("Refunded {total_refunded}")),
                location: None,
                actor: Actor::System,
            }));
        }

        Ok(events)
    }
}

// Helpers
impl Order {
    fn ensure_transition(&self, to: OrderStatus) -> Result<(), OrderError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(self.invalid_transition(to))
        }
    }

    fn invalid_transition(&self, to: OrderStatus) -> OrderError {
        OrderError::InvalidTransition {
            from: self.status,
            to,
        }
    }

    fn ensure_delivery_open(&self) -> Result<(), OrderError> {
        if self.status.is_closed() {
            return Err(OrderError::DeliveryClosed {
                status: self.status,
            });
        }
        Ok(())
    }

    fn issue_otp_if_missing(&self, issued_at: DateTime<Utc>) -> Vec<OrderEvent> {
        if self.delivery.otp.is_some() {
            return vec![];
        }

        vec![OrderEvent::DeliveryOtpIssued(DeliveryOtpIssuedData {
            otp: DeliveryOtp::generate(),
            issued_at,
        })]
    }

    /// Keeps history timestamps non-decreasing when clocks disagree.
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.status_history
            .last()
            .map(|entry| entry.timestamp.max(now))
            .unwrap_or(now)
    }

    fn push_status(
        &mut self,
        status: OrderStatus,
        timestamp: DateTime<Utc>,
        remarks: Option<String>,
        location: Option<String>,
        actor: Actor,
    ) {
        self.status = status;
        self.status_history.push(StatusEntry {
            status,
            timestamp,
            remarks,
            location,
            actor: Some(actor),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn address() -> AddressSnapshot {
        AddressSnapshot {
            contact_person: "Asha Rao".to_string(),
            phone_number: "9000000000".to_string(),
            lines: vec!["12 MG Road".to_string()],
            city: "Pune".to_string(),
            state: "MH".to_string(),
            pincode: "411001".to_string(),
            country: "India".to_string(),
        }
    }

    fn order_with(method: PaymentMethod, requires_prescription: bool) -> Order {
        let item = OrderLineItem {
            medicine_id: MedicineId::new("MED-1"),
            name: "Paracetamol".to_string(),
            quantity: 2,
            unit_price: Money::from_rupees(45),
            unit_mrp: Money::from_rupees(50),
            discount_percent: Decimal::TEN,
            requires_prescription,
            batch_number: None,
        };

        Order::place(PlacedOrder {
            id: OrderId::new(),
            order_number: "MED12345678001".to_string(),
            user_id: UserId::new(),
            items: vec![item],
            address: address(),
            payment: Payment::pending(method, None),
            pricing: PriceBreakdown {
                subtotal: Money::from_rupees(90),
                final_amount: Money::from_rupees(143),
                ..PriceBreakdown::default()
            },
            requires_prescription,
            prescription_refs: vec![],
            notes: None,
            placed_at: t0(),
        })
    }

    fn order() -> Order {
        order_with(PaymentMethod::Online, false)
    }

    fn advance(order: &mut Order, status: OrderStatus, at: DateTime<Utc>) {
        let events = order
            .update_status(status, None, None, Actor::System, at)
            .unwrap();
        order.apply_events(events);
    }

    fn deliver(order: &mut Order, at: DateTime<Utc>) {
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
        ] {
            advance(order, status, at);
        }
        let handoff = Handoff {
            delivered_by: "Ravi".to_string(),
            received_by: Some("Asha".to_string()),
            images: vec![],
        };
        let events = order
            .mark_delivered(handoff, None, Actor::System, at)
            .unwrap();
        order.apply_events(events);
    }

    fn assert_history_consistent(order: &Order) {
        let history = order.status_history();
        assert_eq!(history.last().map(|e| e.status), Some(order.status()));
        for pair in history.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn test_new_order_starts_placed() {
        let order = order();
        assert_eq!(order.status(), OrderStatus::Placed);
        assert_eq!(order.status_history().len(), 1);
        assert_history_consistent(&order);
    }

    #[test]
    fn test_status_update_appends_history() {
        let mut order = order();
        let events = order
            .update_status(
                OrderStatus::Confirmed,
                Some("Accepted".to_string()),
                Some("Pune hub".to_string()),
                Actor::Admin("ops".to_string()),
                t0() + Duration::minutes(5),
            )
            .unwrap();
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Confirmed);
        let last = order.status_history().last().unwrap();
        assert_eq!(last.remarks.as_deref(), Some("Accepted"));
        assert_eq!(last.location.as_deref(), Some("Pune hub"));
        assert_eq!(last.actor, Some(Actor::Admin("ops".to_string())));
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        let order = order();
        let result = order.update_status(OrderStatus::Packed, None, None, Actor::System, t0());
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Placed,
                to: OrderStatus::Packed
            })
        ));
    }

    #[test]
    fn test_history_timestamps_never_go_backwards() {
        let mut order = order();
        advance(&mut order, OrderStatus::Confirmed, t0() - Duration::hours(1));

        assert_eq!(order.status_history()[1].timestamp, t0());
        assert_history_consistent(&order);
    }

    #[test]
    fn test_prescription_orders_need_verification() {
        let mut order = order_with(PaymentMethod::Online, true);
        advance(&mut order, OrderStatus::Confirmed, t0());

        let result = order.update_status(OrderStatus::Processing, None, None, Actor::System, t0());
        assert!(matches!(result, Err(OrderError::PrescriptionRequired)));

        advance(&mut order, OrderStatus::PrescriptionPending, t0());
        advance(&mut order, OrderStatus::PrescriptionVerified, t0());
        advance(&mut order, OrderStatus::Processing, t0());
        assert!(order.prescription_verified());
        assert_eq!(order.status(), OrderStatus::Processing);
    }

    #[test]
    fn test_out_for_delivery_issues_otp_once() {
        let mut order = order();
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
        ] {
            advance(&mut order, status, t0());
        }
        let events = order
            .update_status(OrderStatus::OutForDelivery, None, None, Actor::System, t0())
            .unwrap();
        assert_eq!(events.len(), 2);
        order.apply_events(events);

        let otp = order.delivery_otp().cloned().unwrap();
        assert!(order.ensure_delivery_otp(t0()).unwrap().is_empty());
        assert_eq!(order.delivery_otp(), Some(&otp));
    }

    #[test]
    fn test_existing_otp_survives_out_for_delivery() {
        let mut order = order();
        let events = order.ensure_delivery_otp(t0()).unwrap();
        order.apply_events(events);
        let otp = order.delivery_otp().cloned().unwrap();

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
        ] {
            advance(&mut order, status, t0());
        }
        assert_eq!(order.delivery_otp(), Some(&otp));
    }

    #[test]
    fn test_assign_partner_always_issues_otp() {
        let mut order = order();
        let partner = DeliveryPartner {
            name: "Ravi".to_string(),
            phone: "9111111111".to_string(),
            vehicle_number: None,
            partner_id: None,
        };

        for _ in 0..2 {
            let events = order
                .assign_delivery_partner(partner.clone(), t0())
                .unwrap();
            assert!(matches!(
                events.as_slice(),
                [OrderEvent::DeliveryPartnerAssigned(_)]
            ));
            order.apply_events(events);
        }

        assert_eq!(order.delivery().partner.as_ref(), Some(&partner));
        assert!(order.delivery_otp().is_some());
        // Partner changes do not touch status history.
        assert_eq!(order.status_history().len(), 1);
    }

    #[test]
    fn test_wrong_otp_blocks_delivery() {
        let mut order = order();
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
        ] {
            advance(&mut order, status, t0());
        }
        let issued = order.delivery_otp().unwrap().as_str().to_string();
        let wrong = if issued == "1000" { "1001" } else { "1000" };
        let handoff = Handoff {
            delivered_by: "Ravi".to_string(),
            received_by: None,
            images: vec![],
        };

        let result = order.mark_delivered(handoff.clone(), Some(wrong), Actor::System, t0());
        assert!(matches!(result, Err(OrderError::InvalidDeliveryOtp)));

        let events = order
            .mark_delivered(handoff, Some(&issued), Actor::System, t0())
            .unwrap();
        order.apply_events(events);
        assert_eq!(order.status(), OrderStatus::Delivered);
    }

    #[test]
    fn test_delivery_settles_cod_payment() {
        let mut order = order_with(PaymentMethod::Cod, false);
        assert_eq!(order.paid_amount(), Money::zero());

        deliver(&mut order, t0());

        assert_eq!(order.payment().status, PaymentStatus::Completed);
        assert_eq!(order.paid_amount(), Money::from_rupees(143));
        assert_eq!(order.delivery().actual_delivery_time, Some(t0()));
        assert_history_consistent(&order);
    }

    #[test]
    fn test_cancelling_delivered_order_is_rejected() {
        let mut order = order();
        deliver(&mut order, t0());

        assert!(!order.status().can_be_cancelled());
        let result = order.cancel("Too late".to_string(), Actor::System, None, t0());
        assert!(matches!(
            result,
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled
            })
        ));
    }

    #[test]
    fn test_cancel_defaults_refund_to_paid_amount() {
        let mut order = order();
        let events = order.confirm_payment(Some("txn-1".to_string()), t0()).unwrap();
        order.apply_events(events);

        let events = order
            .cancel("Changed mind".to_string(), Actor::Customer(order.user_id()), None, t0())
            .unwrap();
        order.apply_events(events);

        let cancellation = order.cancellation().unwrap();
        assert_eq!(cancellation.refund_amount, Money::from_rupees(143));
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_history_consistent(&order);
    }

    #[test]
    fn test_other_customers_cannot_cancel() {
        let order = order();
        let result = order.cancel(
            "Not mine".to_string(),
            Actor::Customer(UserId::new()),
            None,
            t0(),
        );
        assert!(matches!(result, Err(OrderError::Forbidden { .. })));
    }

    #[test]
    fn test_customers_cannot_move_or_deliver_orders() {
        let order = order();
        let owner = Actor::Customer(order.user_id());

        let result = order.update_status(OrderStatus::Confirmed, None, None, owner.clone(), t0());
        assert!(matches!(result, Err(OrderError::Forbidden { .. })));

        let handoff = Handoff {
            delivered_by: "Asha".to_string(),
            received_by: None,
            images: vec![],
        };
        let result = order.mark_delivered(handoff, None, owner.clone(), t0());
        assert!(matches!(result, Err(OrderError::Forbidden { .. })));

        let events = order
            .update_status(OrderStatus::Cancelled, None, None, owner, t0())
            .unwrap();
        assert!(matches!(events.as_slice(), [OrderEvent::Cancelled(_)]));
    }

    #[test]
    fn test_return_after_window_is_rejected() {
        let mut order = order();
        deliver(&mut order, t0());

        let result = order.request_return(
            "Damaged".to_string(),
            Actor::System,
            t0() + Duration::days(8),
        );
        assert!(matches!(
            result,
            Err(OrderError::ReturnWindowExpired { .. })
        ));
        assert!(!order.is_returnable(t0() + Duration::days(8)));
    }

    #[test]
    fn test_return_within_window() {
        let mut order = order();
        deliver(&mut order, t0());

        let events = order
            .request_return(
                "Wrong strength".to_string(),
                Actor::Customer(order.user_id()),
                t0() + Duration::days(7),
            )
            .unwrap();
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Returned);
        assert!(order.return_request().is_some());
        assert_history_consistent(&order);
    }

    #[test]
    fn test_return_before_delivery_is_rejected() {
        let order = order();
        let result = order.request_return("Nope".to_string(), Actor::System, t0());
        assert!(matches!(result, Err(OrderError::InvalidTransition { .. })));
    }

    #[test]
    fn test_confirm_payment_confirms_placed_order() {
        let mut order = order();
        let events = order.confirm_payment(Some("txn-1".to_string()), t0()).unwrap();
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(order.payment().transaction_id.as_deref(), Some("txn-1"));
        assert!(order.confirm_payment(None, t0()).unwrap().is_empty());
    }

    #[test]
    fn test_partial_then_full_refund() {
        let mut order = order();
        let events = order.confirm_payment(None, t0()).unwrap();
        order.apply_events(events);
        let events = order
            .cancel("Out of area".to_string(), Actor::System, None, t0())
            .unwrap();
        order.apply_events(events);

        let events = order.process_refund(Money::from_rupees(43), t0()).unwrap();
        order.apply_events(events);
        assert_eq!(order.payment().status, PaymentStatus::PartiallyRefunded);
        assert_eq!(order.status(), OrderStatus::Cancelled);

        let events = order.process_refund(Money::from_rupees(100), t0()).unwrap();
        order.apply_events(events);
        assert_eq!(order.payment().status, PaymentStatus::Refunded);
        assert_eq!(order.payment().refund_amount, Money::from_rupees(143));
        assert_eq!(order.status(), OrderStatus::Refunded);
        assert_history_consistent(&order);
    }

    #[test]
    fn test_refund_on_active_order_keeps_status() {
        let mut order = order();
        let events = order.confirm_payment(None, t0()).unwrap();
        order.apply_events(events);

        let events = order.process_refund(Money::from_rupees(143), t0()).unwrap();
        order.apply_events(events);

        assert_eq!(order.payment().status, PaymentStatus::Refunded);
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn test_refund_validation() {
        let mut order = order();
        let result = order.process_refund(Money::from_rupees(10), t0());
        assert!(matches!(result, Err(OrderError::InvalidAmount { .. })));

        let events = order.confirm_payment(None, t0()).unwrap();
        order.apply_events(events);

        assert!(order.process_refund(Money::zero(), t0()).is_err());
        assert!(order.process_refund(Money::from_rupees(144), t0()).is_err());
    }

    #[test]
    fn test_refunded_only_through_refund() {
        let mut order = order();
        let events = order
            .cancel("Duplicate".to_string(), Actor::System, None, t0())
            .unwrap();
        order.apply_events(events);

        let result = order.update_status(OrderStatus::Refunded, None, None, Actor::System, t0());
        assert!(result.is_err());
    }

    #[test]
    fn test_update_status_delegates_cancel() {
        let mut order = order();
        let events = order
            .update_status(
                OrderStatus::Cancelled,
                Some("Customer called".to_string()),
                None,
                Actor::Admin("ops".to_string()),
                t0(),
            )
            .unwrap();
        order.apply_events(events);

        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.cancellation().unwrap().reason, "Customer called");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut order = order();
        deliver(&mut order, t0());

        let json = serde_json::to_string(&order).unwrap();
        let restored: Order = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.status(), OrderStatus::Delivered);
        assert_eq!(restored.status_history(), order.status_history());
        assert_eq!(restored.order_number(), order.order_number());
    }
}
