//! Order creation, checkout and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{AddressId, CartId, OrderId, ProductId, VariantId};
use domain::{CheckoutIssue, Order, Reservation};
use fulfillment::CreateOrder;
use serde::{Deserialize, Serialize};
use store::{CommerceStore, OrderTransition};

use super::AppState;
use crate::error::ApiError;
use crate::extract::{Tenant, User};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub cart_id: CartId,
    pub shipping_address_id: AddressId,
    #[serde(default)]
    pub billing_address_id: Option<AddressId>,
    pub payment_method: String,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

impl CreateOrderRequest {
    fn into_command(self, Tenant(tenant_id): Tenant, User(user_id): User) -> CreateOrder {
        CreateOrder {
            tenant_id,
            user_id,
            cart_id: self.cart_id,
            shipping_address_id: self.shipping_address_id,
            billing_address_id: self.billing_address_id,
            payment_method: self.payment_method,
            coupon_code: self.coupon_code,
        }
    }
}

#[derive(Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_reference: String,
}

#[derive(Deserialize, Default)]
pub struct ShipOrderRequest {
    #[serde(default)]
    pub tracking_number: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub order_number: String,
    pub status: &'static str,
    pub payment_status: &'static str,
    pub payment_method: String,
    pub payment_reference: Option<String>,
    pub tracking_number: Option<String>,
    pub coupon_code: Option<String>,
    pub lines: Vec<OrderLineResponse>,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub price_cents: i64,
    pub line_total_cents: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id,
            order_number: order.order_number.to_string(),
            status: order.status().as_str(),
            payment_status: order.payment_status().as_str(),
            payment_method: order.payment_method.clone(),
            payment_reference: order.payment_reference().map(String::from),
            tracking_number: order.tracking_number().map(String::from),
            coupon_code: order.coupon_code.as_ref().map(|c| c.as_str().to_string()),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id,
                    variant_id: line.variant_id,
                    quantity: line.quantity,
                    price_cents: line.price_at_purchase.cents(),
                    line_total_cents: line.line_total().cents(),
                })
                .collect(),
            subtotal_cents: order.totals.subtotal.cents(),
            shipping_cents: order.totals.shipping.cents(),
            tax_cents: order.totals.tax.cents(),
            discount_cents: order.totals.discount.cents(),
            total_cents: order.totals.total.cents(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct CheckoutResponse {
    pub order: OrderResponse,
    /// Absent when reserving stock was deferred to a follow-up task.
    pub reservation: Option<Reservation>,
    pub warnings: Vec<CheckoutIssue>,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub order: OrderResponse,
    pub reservation: Option<Reservation>,
}

impl From<OrderTransition> for TransitionResponse {
    fn from(transition: OrderTransition) -> Self {
        Self {
            order: OrderResponse::from(&transition.order),
            reservation: transition.reservation,
        }
    }
}

// -- Handlers --

/// POST /orders: create an order from the caller's cart without reserving
/// stock.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    user: User,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .fulfillment
        .create_order(req.into_command(tenant, user))
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// POST /checkout: validate the cart, create the order and reserve stock.
#[tracing::instrument(skip(state, req))]
pub async fn checkout<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    tenant: Tenant,
    user: User,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let outcome = state
        .fulfillment
        .checkout(req.into_command(tenant, user))
        .await?;

    let status = if outcome.reservation.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::ACCEPTED
    };
    Ok((
        status,
        Json(CheckoutResponse {
            order: OrderResponse::from(&outcome.order),
            reservation: outcome.reservation,
            warnings: outcome.warnings,
        }),
    ))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.fulfillment.order(tenant_id, id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/:id/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.fulfillment.cancel_order(tenant_id, id).await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/:id/payment: payment provider reported success.
#[tracing::instrument(skip(state, req))]
pub async fn confirm_payment<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<OrderId>,
    Json(req): Json<ConfirmPaymentRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let transition = state
        .fulfillment
        .confirm_payment(tenant_id, id, &req.payment_reference)
        .await?;
    Ok(Json(transition.into()))
}

/// POST /orders/:id/payment/failure: payment provider reported failure.
#[tracing::instrument(skip(state))]
pub async fn fail_payment<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<OrderId>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let transition = state.fulfillment.fail_payment(tenant_id, id).await?;
    Ok(Json(transition.into()))
}

/// POST /orders/:id/ship
#[tracing::instrument(skip(state, req))]
pub async fn ship<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<OrderId>,
    Json(req): Json<ShipOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .fulfillment
        .ship_order(tenant_id, id, req.tracking_number)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/:id/deliver
#[tracing::instrument(skip(state))]
pub async fn deliver<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state.fulfillment.deliver_order(tenant_id, id).await?;
    Ok(Json(OrderResponse::from(&order)))
}
