//! Order service providing a simplified API for order operations.

use chrono::Utc;
use common::{OrderId, UserId};
use store::DocumentStore;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::repository::{CommandResult, Repository};

use super::{
    Actor, AssignDeliveryPartner, CancelOrder, ConfirmPayment, Handoff, MarkDelivered, Order,
    OrderEvent, ProcessRefund, RequestReturn, UpdateStatus,
};

/// Service for managing placed orders.
///
/// Wraps the order repository: each call loads the order, runs one command
/// against it and saves the result under optimistic concurrency.
pub struct OrderService<S: DocumentStore> {
    repository: Repository<S, Order>,
}

impl<S: DocumentStore> OrderService<S> {
    /// Creates a new order service with the given store.
    pub fn new(store: S) -> Self {
        Self {
            repository: Repository::new(store),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &Repository<S, Order> {
        &self.repository
    }

    /// Saves a freshly placed order.
    ///
    /// Fails with a conflict if the id or order number is already taken.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id(), order_number = order.order_number()))]
    pub async fn save_new(&self, order: &mut Order) -> Result<(), DomainError> {
        self.repository.save(order).await?;
        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(user_id = %order.user_id(), "Order placed");
        Ok(())
    }

    /// Loads an order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order, DomainError> {
        self.repository.load_existing(&order_id.to_string()).await
    }

    /// Loads an order on behalf of `actor`.
    pub async fn get_order_as(&self, order_id: OrderId, actor: &Actor) -> Result<Order, DomainError> {
        let order = self.get_order(order_id).await?;
        order.authorize(actor)?;
        Ok(order)
    }

    /// Lists a user's orders, newest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_for_user(
        &self,
        user_id: UserId,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Order>, DomainError> {
        self.repository
            .load_owned_by(&user_id.to_string(), limit, offset)
            .await
    }

    /// Moves an order to a new status.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, status = %cmd.status))]
    pub async fn update_status(
        &self,
        cmd: UpdateStatus,
    ) -> Result<CommandResult<Order>, DomainError> {
        let UpdateStatus {
            order_id,
            status,
            remarks,
            location,
            actor,
        } = cmd;

        self.run(order_id, |order| {
            order.update_status(status, remarks, location, actor, Utc::now())
        })
        .await
    }

    /// Issues a delivery OTP unless one exists.
    #[tracing::instrument(skip(self))]
    pub async fn ensure_delivery_otp(
        &self,
        order_id: OrderId,
    ) -> Result<CommandResult<Order>, DomainError> {
        self.run(order_id, |order| order.ensure_delivery_otp(Utc::now()))
            .await
    }

    /// Assigns a delivery partner with a fresh OTP.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn assign_delivery_partner(
        &self,
        cmd: AssignDeliveryPartner,
    ) -> Result<CommandResult<Order>, DomainError> {
        let partner = cmd.partner;

        self.run(cmd.order_id, |order| {
            order.assign_delivery_partner(partner, Utc::now())
        })
        .await
    }

    /// Records the handoff to the customer.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn mark_delivered(
        &self,
        cmd: MarkDelivered,
    ) -> Result<CommandResult<Order>, DomainError> {
        let handoff = Handoff {
            delivered_by: cmd.delivered_by,
            received_by: cmd.received_by,
            images: cmd.images,
        };
        let otp = cmd.otp;
        let actor = cmd.actor;

        self.run(cmd.order_id, |order| {
            order.mark_delivered(handoff, otp.as_deref(), actor, Utc::now())
        })
        .await
    }

    /// Cancels an order.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn cancel_order(
        &self,
        cmd: CancelOrder,
    ) -> Result<CommandResult<Order>, DomainError> {
        let CancelOrder {
            order_id,
            reason,
            cancelled_by,
            refund_amount,
        } = cmd;

        self.run(order_id, |order| {
            order.cancel(reason, cancelled_by, refund_amount, Utc::now())
        })
        .await
    }

    /// Returns a delivered order.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn request_return(
        &self,
        cmd: RequestReturn,
    ) -> Result<CommandResult<Order>, DomainError> {
        let RequestReturn {
            order_id,
            reason,
            requested_by,
        } = cmd;

        self.run(order_id, |order| {
            order.request_return(reason, requested_by, Utc::now())
        })
        .await
    }

    /// Records a payment callback.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id))]
    pub async fn confirm_payment(
        &self,
        cmd: ConfirmPayment,
    ) -> Result<CommandResult<Order>, DomainError> {
        let transaction_id = cmd.transaction_id;

        self.run(cmd.order_id, |order| {
            order.confirm_payment(transaction_id, Utc::now())
        })
        .await
    }

    /// Refunds part or all of the paid amount.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, amount = %cmd.amount))]
    pub async fn process_refund(
        &self,
        cmd: ProcessRefund,
    ) -> Result<CommandResult<Order>, DomainError> {
        let amount = cmd.amount;

        self.run(cmd.order_id, |order| order.process_refund(amount, Utc::now()))
            .await
    }

    async fn run<F>(
        &self,
        order_id: OrderId,
        command_fn: F,
    ) -> Result<CommandResult<Order>, DomainError>
    where
        F: FnOnce(&Order) -> Result<Vec<OrderEvent>, super::OrderError>,
    {
        let result = self
            .repository
            .execute(&order_id.to_string(), command_fn)
            .await?;

        for status in result.events.iter().filter_map(OrderEvent::status) {
            metrics::counter!("order_status_transitions_total", "status" => status.as_str())
                .increment(1);
            tracing::info!(
                %order_id,
                order_number = result.aggregate.order_number(),
                status = %status,
                version = %result.aggregate.version(),
                "Order status changed"
            );
        }

        Ok(result)
    }
}
