//! Reservation lookup and manual confirm/cancel.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{ReservationId, TenantId};
use domain::Reservation;
use fulfillment::FulfillmentError;
use store::CommerceStore;

use super::AppState;
use crate::error::ApiError;
use crate::extract::Tenant;

/// Loads a reservation, hiding ones whose order belongs to another tenant.
async fn owned<S: CommerceStore + Clone + 'static>(
    state: &AppState<S>,
    tenant_id: TenantId,
    id: ReservationId,
) -> Result<Reservation, ApiError> {
    let reservation = state.fulfillment.reservations().get(id).await?;
    state
        .fulfillment
        .order(tenant_id, reservation.order_id)
        .await
        .map_err(|err| match err {
            FulfillmentError::NotFound { .. } => {
                ApiError::NotFound(format!("reservation not found: {id}"))
            }
            other => other.into(),
        })?;
    Ok(reservation)
}

/// GET /reservations/:id
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, ApiError> {
    Ok(Json(owned(&state, tenant_id, id).await?))
}

/// POST /reservations/:id/confirm
#[tracing::instrument(skip(state))]
pub async fn confirm<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, ApiError> {
    owned(&state, tenant_id, id).await?;
    let reservation = state.fulfillment.reservations().confirm(id).await?;
    Ok(Json(reservation))
}

/// POST /reservations/:id/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Tenant(tenant_id): Tenant,
    Path(id): Path<ReservationId>,
) -> Result<Json<Reservation>, ApiError> {
    owned(&state, tenant_id, id).await?;
    let reservation = state.fulfillment.reservations().cancel(id).await?;
    Ok(Json(reservation))
}
