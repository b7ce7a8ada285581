//! Integration tests for carts, checkout and the order lifecycle.
//!
//! These tests drive the public services against the in-memory store and
//! check the cross-module behavior: cart pricing flowing into orders, the
//! status history invariant, concurrency handling and the return window.

use chrono::{DateTime, Duration, Utc};
use common::{MedicineId, UserId};
use domain::order::{
    CancelOrder, ConfirmPayment, Handoff, MarkDelivered, RequestReturn, StatusEntry, UpdateStatus,
};
use domain::{
    Actor, AddressSnapshot, Aggregate, CartPolicy, CartService, CheckoutRequest, Coupon,
    DomainError, ErrorKind, EventSourced, FactoryConfig, MedicineSnapshot, Money, Order,
    OrderError, OrderFactory, OrderService, OrderStatus, PaymentIntent, PricingEngine, Repository,
};
use rust_decimal_macros::dec;
use store::InMemoryDocumentStore;

fn paracetamol() -> MedicineSnapshot {
    MedicineSnapshot {
        name: "Paracetamol 500mg".to_string(),
        unit_price: Money::from_rupees(45),
        unit_mrp: Money::from_rupees(50),
        discount_percent: dec!(10),
        requires_prescription: false,
        available_stock: 40,
        batch_number: Some("PCM-24".to_string()),
    }
}

fn checkout_request() -> CheckoutRequest {
    CheckoutRequest {
        address: Some(AddressSnapshot {
            contact_person: "Asha Rao".to_string(),
            phone_number: "9000000000".to_string(),
            lines: vec!["12 MG Road".to_string()],
            city: "Pune".to_string(),
            state: "MH".to_string(),
            pincode: "411001".to_string(),
            country: "India".to_string(),
        }),
        payment: PaymentIntent::cod(),
        prescription_required: false,
        prescription_refs: vec![],
        notes: None,
    }
}

fn factory() -> OrderFactory {
    OrderFactory::new(FactoryConfig::default(), PricingEngine::default())
}

fn assert_history_invariant(order: &Order) {
    let history: &[StatusEntry] = order.status_history();
    assert_eq!(history.last().map(|e| e.status), Some(order.status()));
    assert!(
        history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
        "history timestamps must be non-decreasing"
    );
}

async fn placed_order(
    store: &InMemoryDocumentStore,
    user_id: UserId,
) -> (OrderService<InMemoryDocumentStore>, Order) {
    let carts = CartService::new(store.clone(), CartPolicy::default());
    carts
        .add_item(user_id, MedicineId::new("PCM"), 2, paracetamol())
        .await
        .unwrap();

    let snapshot = carts.snapshot(user_id).await.unwrap();
    let mut order = factory()
        .create_order(&snapshot, checkout_request(), Utc::now())
        .unwrap();

    let orders = OrderService::new(store.clone());
    orders.save_new(&mut order).await.unwrap();
    (orders, order)
}

async fn advance(orders: &OrderService<InMemoryDocumentStore>, order: &Order, status: OrderStatus) {
    orders
        .update_status(UpdateStatus {
            order_id: order.id(),
            status,
            remarks: None,
            location: None,
            actor: Actor::Admin("ops".to_string()),
        })
        .await
        .unwrap();
}

mod cart_to_order {
    use super::*;

    #[tokio::test]
    async fn cart_pricing_is_frozen_into_order() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new();
        let carts = CartService::new(store.clone(), CartPolicy::default());

        carts
            .add_item(user, MedicineId::new("PCM"), 2, paracetamol())
            .await
            .unwrap();
        carts
            .apply_coupon(
                user,
                Coupon::percentage("SAVE10", dec!(10)).capped_at(Money::from_rupees(200)),
            )
            .await
            .unwrap();

        let snapshot = carts.snapshot(user).await.unwrap();
        let order = factory()
            .create_order(&snapshot, checkout_request(), Utc::now())
            .unwrap();

        assert_eq!(order.pricing().coupon_discount, Money::from_rupees(9));
        assert_eq!(order.pricing().final_amount, Money::from_rupees(134));
        assert_eq!(order.items()[0].batch_number.as_deref(), Some("PCM-24"));
    }

    #[tokio::test]
    async fn repeated_adds_merge_into_one_line() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new();
        let carts = CartService::new(store, CartPolicy::default());

        carts
            .add_item(user, MedicineId::new("PCM"), 2, paracetamol())
            .await
            .unwrap();
        let cart = carts
            .add_item(user, MedicineId::new("PCM"), 3, paracetamol())
            .await
            .unwrap();

        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
    }

    #[tokio::test]
    async fn update_to_zero_resets_pricing() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new();
        let carts = CartService::new(store, CartPolicy::default());

        carts
            .add_item(user, MedicineId::new("PCM"), 2, paracetamol())
            .await
            .unwrap();
        let cart = carts
            .update_item(user, MedicineId::new("PCM"), 0)
            .await
            .unwrap();

        assert!(cart.is_empty());
        assert_eq!(*cart.pricing(), domain::PriceBreakdown::default());

        let err = factory()
            .create_order(&cart.snapshot(), checkout_request(), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCart);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn full_delivery_lifecycle() {
        let store = InMemoryDocumentStore::new();
        let (orders, order) = placed_order(&store, UserId::new()).await;

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
        ] {
            advance(&orders, &order, status).await;
        }

        let loaded = orders.get_order(order.id()).await.unwrap();
        let otp = loaded.delivery_otp().unwrap().as_str().to_string();

        let result = orders
            .mark_delivered(MarkDelivered {
                order_id: order.id(),
                delivered_by: "Ravi".to_string(),
                received_by: Some("Asha".to_string()),
                images: vec!["proof-1.jpg".to_string()],
                otp: Some(otp),
                actor: Actor::DeliveryPartner("ravi".to_string()),
            })
            .await
            .unwrap();

        let delivered = result.aggregate;
        assert_eq!(delivered.status(), OrderStatus::Delivered);
        assert_eq!(delivered.status_history().len(), 7);
        assert_eq!(delivered.paid_amount(), delivered.pricing().final_amount);
        assert_eq!(delivered.delivery().images, vec!["proof-1.jpg".to_string()]);
        assert_history_invariant(&delivered);
    }

    #[tokio::test]
    async fn cancelling_a_delivered_order_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let (orders, order) = placed_order(&store, UserId::new()).await;

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            advance(&orders, &order, status).await;
        }

        let loaded = orders.get_order(order.id()).await.unwrap();
        assert!(!loaded.status().can_be_cancelled());

        let err = orders
            .cancel_order(CancelOrder {
                order_id: order.id(),
                reason: "Late".to_string(),
                cancelled_by: Actor::System,
                refund_amount: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[tokio::test]
    async fn return_after_eight_days_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new();
        let (_, mut order) = placed_order(&store, user).await;
        let t0: DateTime<Utc> = order.created_at();

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
        ] {
            let events = order
                .update_status(status, None, None, Actor::System, t0)
                .unwrap();
            order.apply_events(events);
        }
        let handoff = Handoff {
            delivered_by: "Ravi".to_string(),
            received_by: None,
            images: vec![],
        };
        let events = order
            .mark_delivered(handoff, None, Actor::System, t0)
            .unwrap();
        order.apply_events(events);

        let err = order
            .request_return(
                "Wrong item".to_string(),
                Actor::Customer(user),
                t0 + Duration::days(8),
            )
            .unwrap_err();
        assert!(matches!(err, OrderError::ReturnWindowExpired { .. }));
        assert_eq!(err.kind(), ErrorKind::ReturnWindowExpired);
    }

    #[tokio::test]
    async fn return_within_window_through_service() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new();
        let (orders, order) = placed_order(&store, user).await;

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Packed,
            OrderStatus::ReadyForPickup,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            advance(&orders, &order, status).await;
        }

        let result = orders
            .request_return(RequestReturn {
                order_id: order.id(),
                reason: "Allergic reaction".to_string(),
                requested_by: Actor::Customer(user),
            })
            .await
            .unwrap();

        assert_eq!(result.aggregate.status(), OrderStatus::Returned);
        assert_history_invariant(&result.aggregate);
    }

    #[tokio::test]
    async fn stale_writes_are_rejected() {
        let store = InMemoryDocumentStore::new();
        let (orders, order) = placed_order(&store, UserId::new()).await;

        let repository: Repository<InMemoryDocumentStore, Order> = Repository::new(store.clone());
        let mut stale = repository
            .load_existing(&order.id().to_string())
            .await
            .unwrap();

        orders
            .confirm_payment(ConfirmPayment {
                order_id: order.id(),
                transaction_id: None,
            })
            .await
            .unwrap();

        let events = stale
            .cancel("Duplicate".to_string(), Actor::System, None, Utc::now())
            .unwrap();
        stale.apply_events(events);
        let err: DomainError = repository.save(&mut stale).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        let current = orders.get_order(order.id()).await.unwrap();
        assert_eq!(current.status(), OrderStatus::Confirmed);
        assert_eq!(current.version().as_i64(), 2);
    }

    #[tokio::test]
    async fn orders_are_listed_per_user() {
        let store = InMemoryDocumentStore::new();
        let user = UserId::new();
        let (orders, _) = placed_order(&store, user).await;
        placed_order(&store, user).await;
        placed_order(&store, UserId::new()).await;

        let mine = orders.list_for_user(user, None, None).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|o| o.user_id() == user));

        let page = orders.list_for_user(user, Some(1), Some(1)).await.unwrap();
        assert_eq!(page.len(), 1);
    }
}
