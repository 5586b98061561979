//! Stock level, adjustment and movement log endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{ProductId, VariantId};
use domain::{StockKey, StockLevel, StockMovement};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::AppState;
use super::carts::VariantQuery;
use crate::error::ApiError;
use crate::extract::Tenant;

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub delta: i64,
    pub reason: String,
}

#[derive(Serialize)]
pub struct StockResponse {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub reserved: u32,
    pub available: u32,
}

impl From<StockLevel> for StockResponse {
    fn from(level: StockLevel) -> Self {
        Self {
            product_id: level.key.product_id,
            variant_id: level.key.variant_id,
            quantity: level.quantity(),
            reserved: level.reserved(),
            available: level.available(),
        }
    }
}

async fn key_for<S: CommerceStore + Clone + 'static>(
    state: &AppState<S>,
    tenant: Tenant,
    product_id: ProductId,
    variant: VariantQuery,
) -> Result<StockKey, ApiError> {
    Ok(state
        .fulfillment
        .tenant_stock_key(tenant.0, product_id, variant.variant_id)
        .await?)
}

/// GET /stock/:product_id: quantity, reserved and available.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(product_id): Path<ProductId>,
    Query(variant): Query<VariantQuery>,
) -> Result<Json<StockResponse>, ApiError> {
    let key = key_for(&state, tenant, product_id, variant).await?;
    let level = state.fulfillment.ledger().get_available(key).await?;
    Ok(Json(level.into()))
}

/// PUT /stock/:product_id: set on-hand quantity.
#[tracing::instrument(skip(state))]
pub async fn set<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(product_id): Path<ProductId>,
    Query(variant): Query<VariantQuery>,
    Json(req): Json<SetStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let key = key_for(&state, tenant, product_id, variant).await?;
    let level = state.fulfillment.ledger().set_stock(key, req.quantity).await?;
    Ok(Json(level.into()))
}

/// POST /stock/:product_id/adjustments: admin correction with a reason.
#[tracing::instrument(skip(state))]
pub async fn adjust<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(product_id): Path<ProductId>,
    Query(variant): Query<VariantQuery>,
    Json(req): Json<AdjustStockRequest>,
) -> Result<Json<StockResponse>, ApiError> {
    let key = key_for(&state, tenant, product_id, variant).await?;
    let level = state
        .fulfillment
        .ledger()
        .adjust(key, req.delta, &req.reason)
        .await?;
    Ok(Json(level.into()))
}

/// GET /stock/:product_id/movements: movement log, oldest first.
#[tracing::instrument(skip(state))]
pub async fn movements<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    Path(product_id): Path<ProductId>,
    Query(variant): Query<VariantQuery>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    let key = key_for(&state, tenant, product_id, variant).await?;
    let movements = state.fulfillment.ledger().movements(key).await?;
    Ok(Json(movements))
}
