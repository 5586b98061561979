//! Operational endpoints: health, Prometheus metrics and follow-up replay.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use fulfillment::FollowUpReport;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::AppState;
use crate::error::ApiError;

const DEFAULT_RETRY_LIMIT: usize = 100;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /metrics: Prometheus text exposition.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}

#[derive(Debug, Deserialize)]
pub struct RetryQuery {
    pub limit: Option<usize>,
}

/// POST /follow-ups/retry: replay queued post-commit work.
#[tracing::instrument(skip(state))]
pub async fn retry_follow_ups<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<RetryQuery>,
) -> Result<Json<FollowUpReport>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_RETRY_LIMIT).clamp(1, 1_000);
    let report = state.fulfillment.retry_follow_ups(limit).await?;
    Ok(Json(report))
}
