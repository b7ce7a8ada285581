//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::MedicineId;
use domain::{Cart, CartLineItem, Coupon, MedicineSnapshot, Money, PriceBreakdown};
use serde::{Deserialize, Serialize};
use store::{DocumentStore, StockLedger};

use super::{AppState, parse_user_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub medicine_id: String,
    pub quantity: u32,
    pub medicine: MedicineSnapshot,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct RewardsRequest {
    pub points: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartResponse {
    pub user_id: String,
    pub items: Vec<CartLineItem>,
    pub coupon: Option<Coupon>,
    pub reward_points: u32,
    pub pricing: PriceBreakdown,
    pub savings: Money,
    pub total_quantity: u32,
    pub requires_prescription: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            user_id: cart.user_id().to_string(),
            items: cart.items().to_vec(),
            coupon: cart.coupon().cloned(),
            reward_points: cart.reward_points(),
            pricing: *cart.pricing(),
            savings: cart.pricing().savings(),
            total_quantity: cart.total_quantity(),
            requires_prescription: cart.requires_prescription(),
            updated_at: cart.updated_at(),
        }
    }
}

// -- Handlers --

/// GET /users/:user_id/cart
#[tracing::instrument(skip(state))]
pub async fn get<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state.checkout.carts().get_cart(user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /users/:user_id/cart
#[tracing::instrument(skip(state))]
pub async fn clear<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state.checkout.carts().clear(user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /users/:user_id/cart/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    if req.medicine_id.trim().is_empty() {
        return Err(ApiError::BadRequest("medicine_id is required".to_string()));
    }

    let cart = state
        .checkout
        .carts()
        .add_item(
            user_id,
            MedicineId::new(req.medicine_id),
            req.quantity,
            req.medicine,
        )
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PATCH /users/:user_id/cart/items/:medicine_id
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path((user_id, medicine_id)): Path<(String, String)>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state
        .checkout
        .carts()
        .update_item(user_id, MedicineId::new(medicine_id), req.quantity)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /users/:user_id/cart/items/:medicine_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path((user_id, medicine_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state
        .checkout
        .carts()
        .remove_item(user_id, MedicineId::new(medicine_id))
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /users/:user_id/cart/coupon
#[tracing::instrument(skip(state, coupon))]
pub async fn apply_coupon<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
    Json(coupon): Json<Coupon>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state.checkout.carts().apply_coupon(user_id, coupon).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /users/:user_id/cart/coupon
#[tracing::instrument(skip(state))]
pub async fn remove_coupon<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state.checkout.carts().remove_coupon(user_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /users/:user_id/cart/rewards
#[tracing::instrument(skip(state, req))]
pub async fn apply_rewards<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(user_id): Path<String>,
    Json(req): Json<RewardsRequest>,
) -> Result<Json<CartResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let user_id = parse_user_id(&user_id)?;
    let cart = state
        .checkout
        .carts()
        .apply_reward_points(user_id, req.points)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}
