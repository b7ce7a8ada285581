//! Stock ledger endpoints used to seed and inspect medicine stock.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::MedicineId;
use serde::{Deserialize, Serialize};
use store::{DocumentStore, StockLedger};

use super::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct StockRequest {
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub medicine_id: MedicineId,
    pub stock: u32,
}

/// PUT /medicines/:id/stock
#[tracing::instrument(skip(state, req))]
pub async fn set_stock<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
    Json(req): Json<StockRequest>,
) -> Result<Json<StockResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let medicine_id = MedicineId::new(id);
    state.desk.set_stock(&medicine_id, req.quantity).await?;
    Ok(Json(StockResponse {
        medicine_id,
        stock: req.quantity,
    }))
}

/// GET /medicines/:id/stock
#[tracing::instrument(skip(state))]
pub async fn get_stock<S, L>(
    State(state): State<Arc<AppState<S, L>>>,
    Path(id): Path<String>,
) -> Result<Json<StockResponse>, ApiError>
where
    S: DocumentStore + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let medicine_id = MedicineId::new(id);
    let stock = state
        .desk
        .stock_level(&medicine_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Medicine {medicine_id} has no stock record")))?;
    Ok(Json(StockResponse { medicine_id, stock }))
}
