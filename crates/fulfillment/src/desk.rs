//! Order desk: lifecycle operations with their side effects.

use std::sync::Arc;

use common::{MedicineId, OrderId, UserId};
use domain::order::{
    AssignDeliveryPartner, CancelOrder, ConfirmPayment, MarkDelivered, ProcessRefund,
    RequestReturn, UpdateStatus,
};
use domain::{
    Actor, AdjustmentMode, AdjustmentReason, AdjustmentReport, CommandResult, InventoryAdjuster,
    Order, OrderEvent, OrderService,
};
use store::{DocumentStore, StockLedger};

use crate::error::Result;
use crate::notifications::{StatusPublisher, publish_events};

/// Result of a lifecycle operation.
#[derive(Debug)]
pub struct DeskOutcome {
    /// The order after the operation.
    pub order: Order,

    /// The events the operation produced.
    pub events: Vec<OrderEvent>,

    /// Stock put back by a cancellation or return.
    pub restock: Option<AdjustmentReport>,
}

/// Runs order lifecycle commands and their follow-ups.
///
/// The order aggregate never touches stock; the desk restocks after a
/// cancellation or return has been saved and publishes every status change.
pub struct OrderDesk<S, L>
where
    S: DocumentStore,
    L: StockLedger,
{
    orders: OrderService<S>,
    inventory: InventoryAdjuster<L>,
    publisher: Arc<dyn StatusPublisher>,
}

impl<S, L> OrderDesk<S, L>
where
    S: DocumentStore,
    L: StockLedger,
{
    /// Creates a new order desk.
    pub fn new(store: S, inventory: InventoryAdjuster<L>, publisher: Arc<dyn StatusPublisher>) -> Self {
        Self {
            orders: OrderService::new(store),
            inventory,
            publisher,
        }
    }

    /// Returns the order service.
    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    /// Returns the inventory adjuster.
    pub fn inventory(&self) -> &InventoryAdjuster<L> {
        &self.inventory
    }

    /// Loads an order on behalf of `actor`.
    pub async fn get_order(&self, order_id: OrderId, actor: &Actor) -> Result<Order> {
        Ok(self.orders.get_order_as(order_id, actor).await?)
    }

    /// Lists a user's orders, newest first.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Order>> {
        Ok(self.orders.list_for_user(user_id, limit, offset).await?)
    }

    /// Sets the stock of a medicine.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, medicine_id: &MedicineId, quantity: u32) -> Result<()> {
        self.inventory.ledger().set_stock(medicine_id, quantity).await?;
        Ok(())
    }

    /// Returns the stock of a medicine, if known.
    pub async fn stock_level(&self, medicine_id: &MedicineId) -> Result<Option<u32>> {
        Ok(self.inventory.ledger().stock_level(medicine_id).await?)
    }

    /// Moves an order to a new status.
    pub async fn update_status(&self, cmd: UpdateStatus) -> Result<DeskOutcome> {
        let result = self.orders.update_status(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Issues a delivery OTP unless one exists.
    pub async fn ensure_delivery_otp(&self, order_id: OrderId) -> Result<DeskOutcome> {
        let result = self.orders.ensure_delivery_otp(order_id).await?;
        Ok(self.follow_up(result).await)
    }

    /// Assigns a delivery partner with a fresh OTP.
    pub async fn assign_delivery_partner(&self, cmd: AssignDeliveryPartner) -> Result<DeskOutcome> {
        let result = self.orders.assign_delivery_partner(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Records the handoff to the customer.
    pub async fn mark_delivered(&self, cmd: MarkDelivered) -> Result<DeskOutcome> {
        let result = self.orders.mark_delivered(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Cancels an order and puts its stock back.
    pub async fn cancel_order(&self, cmd: CancelOrder) -> Result<DeskOutcome> {
        let result = self.orders.cancel_order(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Returns a delivered order and puts its stock back.
    pub async fn request_return(&self, cmd: RequestReturn) -> Result<DeskOutcome> {
        let result = self.orders.request_return(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Records a payment callback.
    pub async fn confirm_payment(&self, cmd: ConfirmPayment) -> Result<DeskOutcome> {
        let result = self.orders.confirm_payment(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Refunds part or all of the paid amount.
    pub async fn process_refund(&self, cmd: ProcessRefund) -> Result<DeskOutcome> {
        let result = self.orders.process_refund(cmd).await?;
        Ok(self.follow_up(result).await)
    }

    /// Restocks and publishes after a saved command.
    ///
    /// Failures here are logged, never returned: the order change is
    /// already saved.
    async fn follow_up(&self, result: CommandResult<Order>) -> DeskOutcome {
        let CommandResult {
            aggregate: order,
            events,
            ..
        } = result;

        let reason = events.iter().find_map(|event| match event {
            OrderEvent::Cancelled(_) => Some(AdjustmentReason::Cancellation),
            OrderEvent::ReturnRequested(_) => Some(AdjustmentReason::Return),
            _ => None,
        });

        let restock = match reason {
            Some(reason) => self.restock(&order, reason).await,
            None => None,
        };

        publish_events(self.publisher.as_ref(), &order, &events).await;

        DeskOutcome {
            order,
            events,
            restock,
        }
    }

    async fn restock(&self, order: &Order, reason: AdjustmentReason) -> Option<AdjustmentReport> {
        // Restocks cannot run out of stock, so each item is tried on its own.
        match self
            .inventory
            .apply_order(
                order.restockable_items(),
                reason,
                AdjustmentMode::BestEffort,
            )
            .await
        {
            Ok(report) => {
                if !report.is_complete() {
                    tracing::warn!(
                        order_id = %order.id(),
                        failed = ?report.failed_medicines(),
                        "Restock incomplete"
                    );
                }
                Some(report)
            }
            Err(e) => {
                tracing::error!(order_id = %order.id(), error = %e, "Restock failed");
                None
            }
        }
    }
}
