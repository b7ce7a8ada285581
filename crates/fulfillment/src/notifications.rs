//! Status-change notifications.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use domain::{Order, OrderEvent, OrderStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// One status change, as delivered to real-time subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub order_number: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub remarks: Option<String>,
}

impl StatusChange {
    /// Describes the order's current status.
    pub fn current(order: &Order) -> Self {
        let last = order.status_history().last();
        Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id(),
            status: order.status(),
            timestamp: last.map(|e| e.timestamp).unwrap_or_else(|| order.updated_at()),
            remarks: last.and_then(|e| e.remarks.clone()),
        }
    }

    /// Describes the status change carried by `event`, if any.
    pub fn from_event(order: &Order, event: &OrderEvent) -> Option<Self> {
        let status = event.status()?;
        Some(Self {
            order_id: order.id(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id(),
            status,
            timestamp: event.occurred_at(),
            remarks: event.remarks().map(str::to_string),
        })
    }
}

/// Delivers status changes to interested parties.
///
/// Publishing is fire-and-forget: a missing subscriber is never an error.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Publishes a status change.
    async fn publish(&self, change: StatusChange);
}

/// Publishes every status change carried by `events`.
pub async fn publish_events(publisher: &dyn StatusPublisher, order: &Order, events: &[OrderEvent]) {
    for change in events
        .iter()
        .filter_map(|event| StatusChange::from_event(order, event))
    {
        publisher.publish(change).await;
    }
}

/// Publisher that drops every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl StatusPublisher for NoopPublisher {
    async fn publish(&self, _change: StatusChange) {}
}

#[derive(Debug, Default)]
struct Channels {
    orders: HashMap<OrderId, broadcast::Sender<StatusChange>>,
    users: HashMap<UserId, broadcast::Sender<StatusChange>>,
}

/// In-process pub/sub keyed by order id and by user id.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    channels: Arc<RwLock<Channels>>,
    capacity: usize,
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BroadcastPublisher {
    /// Creates a publisher whose channels buffer `capacity` changes.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(Channels::default())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribes to changes of one order.
    pub fn subscribe_order(&self, order_id: OrderId) -> broadcast::Receiver<StatusChange> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .orders
            .entry(order_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Subscribes to changes of every order of one user.
    pub fn subscribe_user(&self, user_id: UserId) -> broadcast::Receiver<StatusChange> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels
            .users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Returns the number of open channels.
    pub fn channel_count(&self) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.orders.len() + channels.users.len()
    }
}

#[async_trait]
impl StatusPublisher for BroadcastPublisher {
    async fn publish(&self, change: StatusChange) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);

        // Channels whose receivers are all gone are dropped on send.
        let order_closed = channels
            .orders
            .get(&change.order_id)
            .is_some_and(|sender| sender.send(change.clone()).is_err());
        if order_closed {
            channels.orders.remove(&change.order_id);
        }

        let user_closed = channels
            .users
            .get(&change.user_id)
            .is_some_and(|sender| sender.send(change.clone()).is_err());
        if user_closed {
            channels.users.remove(&change.user_id);
        }

        tracing::debug!(
            order_id = %change.order_id,
            status = %change.status,
            "Status change published"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(order_id: OrderId, user_id: UserId, status: OrderStatus) -> StatusChange {
        StatusChange {
            order_id,
            order_number: "MED00000001000".to_string(),
            user_id,
            status,
            timestamp: Utc::now(),
            remarks: None,
        }
    }

    #[tokio::test]
    async fn test_order_and_user_subscribers_receive_changes() {
        let publisher = BroadcastPublisher::default();
        let order_id = OrderId::new();
        let user_id = UserId::new();

        let mut by_order = publisher.subscribe_order(order_id);
        let mut by_user = publisher.subscribe_user(user_id);

        publisher
            .publish(change(order_id, user_id, OrderStatus::Packed))
            .await;

        assert_eq!(by_order.recv().await.unwrap().status, OrderStatus::Packed);
        assert_eq!(by_user.recv().await.unwrap().status, OrderStatus::Packed);
    }

    #[tokio::test]
    async fn test_other_orders_are_not_delivered() {
        let publisher = BroadcastPublisher::default();
        let user_id = UserId::new();
        let mut by_order = publisher.subscribe_order(OrderId::new());

        publisher
            .publish(change(OrderId::new(), user_id, OrderStatus::Packed))
            .await;

        assert!(by_order.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_abandoned_channels_are_dropped() {
        let publisher = BroadcastPublisher::default();
        let order_id = OrderId::new();
        let user_id = UserId::new();

        drop(publisher.subscribe_order(order_id));
        assert_eq!(publisher.channel_count(), 1);

        publisher
            .publish(change(order_id, user_id, OrderStatus::Confirmed))
            .await;
        assert_eq!(publisher.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let publisher = BroadcastPublisher::default();
        publisher
            .publish(change(OrderId::new(), UserId::new(), OrderStatus::Placed))
            .await;
        NoopPublisher
            .publish(change(OrderId::new(), UserId::new(), OrderStatus::Placed))
            .await;
    }
}
