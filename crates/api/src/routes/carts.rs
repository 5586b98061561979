//! Cart endpoints for the calling shopper.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{CartId, ProductId, VariantId};
use domain::{Cart, CartValidation, StockKey};
use serde::Deserialize;
use store::CommerceStore;

use super::AppState;
use crate::error::ApiError;
use crate::extract::{Tenant, User};

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct VariantQuery {
    pub variant_id: Option<VariantId>,
}

/// GET /cart: the caller's active cart.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    User(user_id): User,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .fulfillment
        .carts()
        .active_cart(tenant_id, user_id)
        .await?;
    Ok(Json(cart))
}

/// POST /cart/items
#[tracing::instrument(skip(state))]
pub async fn add_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    User(user_id): User,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .fulfillment
        .carts()
        .add_item(tenant_id, user_id, req.product_id, req.variant_id, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// PUT /cart/items/:product_id: set a line's quantity; 0 removes it.
#[tracing::instrument(skip(state))]
pub async fn update_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    User(user_id): User,
    Path(product_id): Path<ProductId>,
    Query(variant): Query<VariantQuery>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let key = StockKey::new(product_id, variant.variant_id);
    let cart = state
        .fulfillment
        .carts()
        .update_item(tenant_id, user_id, key, req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart/items/:product_id
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    User(user_id): User,
    Path(product_id): Path<ProductId>,
    Query(variant): Query<VariantQuery>,
) -> Result<Json<Cart>, ApiError> {
    let key = StockKey::new(product_id, variant.variant_id);
    let cart = state
        .fulfillment
        .carts()
        .remove_item(tenant_id, user_id, key)
        .await?;
    Ok(Json(cart))
}

/// GET /carts/:id/validation: pre-checkout consistency report.
#[tracing::instrument(skip(state))]
pub async fn validate<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    User(user_id): User,
    Path(cart_id): Path<CartId>,
) -> Result<Json<CartValidation>, ApiError> {
    let report = state
        .fulfillment
        .validate_cart(tenant_id, user_id, cart_id)
        .await?;
    Ok(Json(report))
}
