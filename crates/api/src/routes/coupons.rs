//! Coupon definition and validation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CouponId, Money};
use domain::{Coupon, CouponDiscount};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::AppState;
use crate::error::ApiError;
use crate::extract::Tenant;

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    pub discount: CouponDiscount,
    #[serde(default)]
    pub max_discount_cents: Option<i64>,
    #[serde(default)]
    pub min_purchase_cents: Option<i64>,
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    pub code: String,
    pub order_total_cents: i64,
}

#[derive(Serialize)]
pub struct CouponValidationResponse {
    pub coupon_id: CouponId,
    pub code: String,
    pub discount_cents: i64,
}

/// POST /coupons: define a coupon for the tenant.
#[tracing::instrument(skip(state))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Json(req): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("coupon code is required".to_string()));
    }
    state
        .fulfillment
        .collaborators()
        .tenants
        .ensure_access(tenant_id)
        .await?;

    let mut coupon = Coupon::new(tenant_id, &req.code, req.discount);
    if let Some(cents) = req.max_discount_cents {
        coupon = coupon.with_max_discount(Money::from_cents(cents));
    }
    if let Some(cents) = req.min_purchase_cents {
        coupon = coupon.with_min_purchase(Money::from_cents(cents));
    }
    if let Some(max_uses) = req.max_uses {
        coupon = coupon.with_max_uses(max_uses);
    }
    if let Some(expires_at) = req.expires_at {
        coupon = coupon.with_expiry(expires_at);
    }

    state.fulfillment.coupons().save(&coupon).await?;
    tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "coupon created");
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// POST /coupons/validate: check a code against an order total.
#[tracing::instrument(skip(state))]
pub async fn validate<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Json(req): Json<ValidateCouponRequest>,
) -> Result<Json<CouponValidationResponse>, ApiError> {
    state
        .fulfillment
        .collaborators()
        .tenants
        .ensure_access(tenant_id)
        .await?;

    let total = Money::from_cents(req.order_total_cents);
    let coupons = state.fulfillment.coupons();
    let coupon = coupons.validate(tenant_id, &req.code, total).await?;
    Ok(Json(CouponValidationResponse {
        coupon_id: coupon.id,
        code: coupon.code.as_str().to_string(),
        discount_cents: coupons.calculate_discount(&coupon, total).cents(),
    }))
}
