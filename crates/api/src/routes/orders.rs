//! Checkout and order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::{DateTime, Utc};
use common::MedicineId;
use domain::order::{
    AssignDeliveryPartner, CancelOrder, Cancellation, ConfirmPayment, DeliveryInfo,
    MarkDelivered, Payment, ProcessRefund, RequestReturn, ReturnRequest, StatusEntry,
    UpdateStatus,
};
use domain::{
    AddressSnapshot, AdjustmentReport, CheckoutRequest, DeliveryPartner, Money, Order,
    OrderEvent, OrderLineItem, OrderStatus, PriceBreakdown,
};
use fulfillment::{CheckoutOutcome, DeskOutcome};
use serde::{Deserialize, Serialize};
use store::{DocumentStore, StockLedger};

use super::{AppState, actor_from_headers, parse_order_id, parse_user_id};
use crate::error::ApiError;

const DEFAULT_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

// -- Request types --

#[derive(Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
    pub remarks: Option<String>,
    pub location: Option<String>,
}

#[derive(Deserialize)]
pub struct DeliverRequest {
    pub delivered_by: String,
    pub received_by: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub otp: Option<String>,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: String,
    pub refund_amount: Option<Money>,
}

#[derive(Deserialize)]
pub struct ReturnRequestBody {
    pub reason: String,
}

#[derive(Deserialize)]
pub struct PaymentRequest {
    pub transaction_id: Option<String>,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub amount: Money,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub items: Vec<OrderLineItem>,
    pub address: AddressSnapshot,
    pub payment: Payment,
    pub paid_amount: Money,
    pub pricing: PriceBreakdown,
    pub status_history: Vec<StatusEntry>,
    pub delivery: DeliveryInfo,
    pub cancellation: Option<Cancellation>,
    pub return_request: Option<ReturnRequest>,
    pub requires_prescription: bool,
    pub prescription_refs: Vec<String>,
    pub prescription_verified: bool,
    pub notes: Option<String>,
    pub stock_shortfall: Vec<MedicineId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            user_id: order.user_id().to_string(),
            status: order.status(),
            status_label: order.status().as_str(),
            items: order.items().to_vec(),
            address: order.address().clone(),
            payment: order.payment().clone(),
            paid_amount: order.paid_amount(),
            pricing: *order.pricing(),
            status_history: order.status_history().to_vec(),
            delivery: order.delivery().clone(),
            cancellation: order.cancellation().cloned(),
            return_request: order.return_request().cloned(),
            requires_prescription: order.requires_prescription(),
            prescription_refs: order.prescription_refs().to_vec(),
            prescription_verified: order.prescription_verified(),
            notes: order.notes().map(String::from),
            stock_shortfall: order.stock_shortfall().to_vec(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    pub stock: AdjustmentReport,
}

impl From<CheckoutOutcome> for CheckoutResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        Self {
            order: OrderResponse::from(&outcome.order),
            stock: outcome.stock,
        }
    }
}

#[derive(Serialize)]
pub struct ActionResponse {
    pub order: OrderResponse,
    pub events: Vec<OrderEvent>,
    pub restock: Option<AdjustmentReport>,
}

impl From<DeskOutcome> for ActionResponse {
    fn from(outcome: DeskOutcome) -> Self {
        Self {
            order: OrderResponse::from(&outcome.order),
            events: outcome.events,
            restock: outcome.restock,
        }
    }
}

// -- Handlers --

/// POST /users/:user_id/checkout: turns the cart into an order.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
    Json(req): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let outcome = state.checkout.place_order(user_id, req).await?;
    Ok((StatusCode::CREATED, Json(CheckoutResponse::from(outcome))))
}

/// GET /users/:user_id/orders: newest first, paginated.
#[tracing::instrument(skip(state, params))]
pub async fn list<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OrderResponse>>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let orders = state
        .desk
        .list_for_user(user_id, Some(limit), params.offset)
        .await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}

/// GET /orders/:id
#[tracing::instrument(skip(state, headers))]
pub async fn get<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<OrderResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let actor = actor_from_headers(&headers)?;
    let order = state.desk.get_order(order_id, &actor).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/:id/status
#[tracing::instrument(skip(state, headers, req))]
pub async fn update_status<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<StatusRequest>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = UpdateStatus {
        order_id: parse_order_id(&id)?,
        status: req.status,
        remarks: req.remarks,
        location: req.location,
        actor: actor_from_headers(&headers)?,
    };
    let outcome = state.desk.update_status(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/otp: issues a delivery OTP unless one exists.
#[tracing::instrument(skip(state))]
pub async fn ensure_otp<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let outcome = state.desk.ensure_delivery_otp(order_id).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/partner: assigns a partner and issues a fresh OTP.
#[tracing::instrument(skip(state, partner))]
pub async fn assign_partner<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    Json(partner): Json<DeliveryPartner>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = AssignDeliveryPartner {
        order_id: parse_order_id(&id)?,
        partner,
    };
    let outcome = state.desk.assign_delivery_partner(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/deliver
#[tracing::instrument(skip(state, headers, req))]
pub async fn deliver<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DeliverRequest>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = MarkDelivered {
        order_id: parse_order_id(&id)?,
        delivered_by: req.delivered_by,
        received_by: req.received_by,
        images: req.images,
        otp: req.otp,
        actor: actor_from_headers(&headers)?,
    };
    let outcome = state.desk.mark_delivered(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/cancel: cancels and restocks.
#[tracing::instrument(skip(state, headers, req))]
pub async fn cancel<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CancelRequest>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = CancelOrder {
        order_id: parse_order_id(&id)?,
        reason: req.reason,
        cancelled_by: actor_from_headers(&headers)?,
        refund_amount: req.refund_amount,
    };
    let outcome = state.desk.cancel_order(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/return: returns a delivered order and restocks.
#[tracing::instrument(skip(state, headers, req))]
pub async fn request_return<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ReturnRequestBody>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = RequestReturn {
        order_id: parse_order_id(&id)?,
        reason: req.reason,
        requested_by: actor_from_headers(&headers)?,
    };
    let outcome = state.desk.request_return(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/payment: payment gateway callback.
#[tracing::instrument(skip(state, req))]
pub async fn confirm_payment<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = ConfirmPayment {
        order_id: parse_order_id(&id)?,
        transaction_id: req.transaction_id,
    };
    let outcome = state.desk.confirm_payment(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}

/// POST /orders/:id/refunds
#[tracing::instrument(skip(state, req))]
pub async fn refund<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<ActionResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let cmd = ProcessRefund {
        order_id: parse_order_id(&id)?,
        amount: req.amount,
    };
    let outcome = state.desk.process_refund(cmd).await?;
    Ok(Json(ActionResponse::from(outcome)))
}
