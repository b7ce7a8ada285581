//! HTTP API server for the medicine order backend.
//!
//! Thin glue over the fulfillment layer: cart, checkout and order lifecycle
//! endpoints plus server-sent status events, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use domain::{CartPolicy, InventoryAdjuster, OrderFactory, PricingEngine};
use fulfillment::{BroadcastPublisher, CheckoutCoordinator, OrderDesk};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{DocumentStore, StockLedger};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, L>(state: Arc<AppState<S, L>>, metrics_handle: PrometheusHandle) -> Router
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/users/{user_id}/cart",
            get(routes::carts::get::<S, L>).delete(routes::carts::clear::<S, L>),
        )
        .route(
            "/users/{user_id}/cart/items",
            post(routes::carts::add_item::<S, L>),
        )
        .route(
            "/users/{user_id}/cart/items/{medicine_id}",
            patch(routes::carts::update_item::<S, L>).delete(routes::carts::remove_item::<S, L>),
        )
        .route(
            "/users/{user_id}/cart/coupon",
            post(routes::carts::apply_coupon::<S, L>).delete(routes::carts::remove_coupon::<S, L>),
        )
        .route(
            "/users/{user_id}/cart/rewards",
            post(routes::carts::apply_rewards::<S, L>),
        )
        .route(
            "/users/{user_id}/checkout",
            post(routes::orders::checkout::<S, L>),
        )
        .route(
            "/users/{user_id}/orders",
            get(routes::orders::list::<S, L>),
        )
        .route(
            "/users/{user_id}/events",
            get(routes::events::user::<S, L>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S, L>))
        .route("/orders/{id}/events", get(routes::events::order::<S, L>))
        .route(
            "/orders/{id}/status",
            post(routes::orders::update_status::<S, L>),
        )
        .route("/orders/{id}/otp", post(routes::orders::ensure_otp::<S, L>))
        .route(
            "/orders/{id}/partner",
            post(routes::orders::assign_partner::<S, L>),
        )
        .route("/orders/{id}/deliver", post(routes::orders::deliver::<S, L>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S, L>))
        .route(
            "/orders/{id}/return",
            post(routes::orders::request_return::<S, L>),
        )
        .route(
            "/orders/{id}/payment",
            post(routes::orders::confirm_payment::<S, L>),
        )
        .route("/orders/{id}/refunds", post(routes::orders::refund::<S, L>))
        .route(
            "/medicines/{id}/stock",
            put(routes::medicines::set_stock::<S, L>).get(routes::medicines::get_stock::<S, L>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the services over a document store and a stock ledger.
pub fn create_state<S, L>(store: S, ledger: L, config: &Config) -> Arc<AppState<S, L>>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let pricing = PricingEngine::new(config.pricing.clone());
    let notifications = BroadcastPublisher::default();
    let inventory = InventoryAdjuster::new(ledger);

    let checkout = CheckoutCoordinator::new(
        store.clone(),
        CartPolicy::new(pricing.clone(), config.cart_limits),
        OrderFactory::new(config.factory.clone(), pricing),
        inventory.clone(),
        Arc::new(notifications.clone()),
        config.stock_mode,
    );
    let desk = OrderDesk::new(store, inventory, Arc::new(notifications.clone()));

    Arc::new(AppState {
        checkout,
        desk,
        notifications,
    })
}
