//! Checkout: turning a user's cart into a placed order.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::UserId;
use domain::order::UpdateStatus;
use domain::{
    Actor, AdjustmentMode, AdjustmentReason, AdjustmentReport, CartPolicy, CartService,
    CheckoutRequest, DomainError, InventoryAdjuster, Order, OrderFactory, OrderService,
    OrderStatus,
};
use store::{DocumentStore, StockLedger};

use crate::error::{FulfillmentError, Result};
use crate::notifications::{StatusChange, StatusPublisher, publish_events};

/// Result of a successful checkout.
#[derive(Debug)]
pub struct CheckoutOutcome {
    /// The saved order.
    pub order: Order,

    /// Stock taken for the order. Only best-effort mode can leave failures.
    pub stock: AdjustmentReport,
}

/// Orchestrates checkout across carts, orders and stock.
///
/// Steps: snapshot the cart, build the order, take stock, save the order,
/// clear the cart, publish. Stock is taken before the order is saved, so a
/// failed save puts the stock back.
pub struct CheckoutCoordinator<S, L>
where
    S: DocumentStore,
    L: StockLedger,
{
    carts: CartService<S>,
    orders: OrderService<S>,
    factory: OrderFactory,
    inventory: InventoryAdjuster<L>,
    publisher: Arc<dyn StatusPublisher>,
    mode: AdjustmentMode,
}

impl<S, L> CheckoutCoordinator<S, L>
where
    S: DocumentStore + Clone,
    L: StockLedger,
{
    /// Creates a new checkout coordinator.
    pub fn new(
        store: S,
        policy: CartPolicy,
        factory: OrderFactory,
        inventory: InventoryAdjuster<L>,
        publisher: Arc<dyn StatusPublisher>,
        mode: AdjustmentMode,
    ) -> Self {
        Self {
            carts: CartService::new(store.clone(), policy),
            orders: OrderService::new(store),
            factory,
            inventory,
            publisher,
            mode,
        }
    }

    /// Returns the cart service used for snapshots.
    pub fn carts(&self) -> &CartService<S> {
        &self.carts
    }

    /// Returns the stock adjustment mode.
    pub fn mode(&self) -> AdjustmentMode {
        self.mode
    }

    /// Places an order from the user's current cart.
    ///
    /// In transactional mode an item without enough stock aborts checkout
    /// and nothing is saved. In best-effort mode the order is saved with the
    /// refused items recorded as a shortfall.
    #[tracing::instrument(skip(self, request), fields(mode = ?self.mode))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome> {
        let started = Instant::now();

        let snapshot = self.carts.snapshot(user_id).await?;
        let mut order = self
            .factory
            .create_order(&snapshot, request, Utc::now())
            .map_err(DomainError::from)?;

        let stock = self
            .inventory
            .apply_order(order.items(), AdjustmentReason::Order, self.mode)
            .await?;

        if !stock.is_complete() {
            tracing::warn!(
                order_number = order.order_number(),
                failed = ?stock.failed_medicines(),
                "Order placed with stock shortfall"
            );
            order.record_stock_shortfall(stock.failed_medicines());
        }

        if let Err(e) = self.orders.save_new(&mut order).await {
            return Err(self.compensate(&order, &stock, e).await);
        }

        if let Err(e) = self.carts.clear_checked_out(user_id, &snapshot).await {
            tracing::warn!(error = %e, "Cart was not cleared after checkout");
        }

        self.publisher.publish(StatusChange::current(&order)).await;

        if order.requires_prescription() {
            order = self.await_prescription(order).await;
        }

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id(),
            order_number = order.order_number(),
            final_amount = %order.pricing().final_amount,
            "Checkout completed"
        );

        Ok(CheckoutOutcome { order, stock })
    }

    /// Routes a prescription order to the pharmacist queue.
    async fn await_prescription(&self, order: Order) -> Order {
        let cmd = UpdateStatus {
            order_id: order.id(),
            status: OrderStatus::PrescriptionPending,
            remarks: Some("Awaiting prescription verification".to_string()),
            location: None,
            actor: Actor::System,
        };

        match self.orders.update_status(cmd).await {
            Ok(result) => {
                publish_events(self.publisher.as_ref(), &result.aggregate, &result.events).await;
                result.aggregate
            }
            Err(e) => {
                // The order stays Placed; staff can still move it by hand.
                tracing::warn!(order_id = %order.id(), error = %e, "Prescription routing failed");
                order
            }
        }
    }

    /// Puts back stock taken for an order that was never saved.
    #[tracing::instrument(skip(self, order, stock), fields(order_number = order.order_number()))]
    async fn compensate(
        &self,
        order: &Order,
        stock: &AdjustmentReport,
        error: DomainError,
    ) -> FulfillmentError {
        let restored = self
            .inventory
            .apply_changes(
                &stock.compensation(),
                AdjustmentReason::Cancellation,
                AdjustmentMode::BestEffort,
            )
            .await;

        match restored {
            Ok(report) if report.is_complete() => {
                tracing::warn!(error = %error, "Order not saved; stock restored");
                FulfillmentError::Domain(error)
            }
            Ok(report) => {
                tracing::error!(error = %error, "Order not saved; stock partially restored");
                FulfillmentError::CompensationFailed {
                    order_number: order.order_number().to_string(),
                    unrestored: report.failed_medicines(),
                    source: error,
                }
            }
            Err(restore_error) => {
                tracing::error!(error = %error, %restore_error, "Order not saved; stock not restored");
                FulfillmentError::CompensationFailed {
                    order_number: order.order_number().to_string(),
                    unrestored: stock.applied.iter().map(|a| a.medicine_id.clone()).collect(),
                    source: error,
                }
            }
        }
    }
}
