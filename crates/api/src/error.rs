//! API error types with HTTP response mapping.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use domain::CouponError;
use fulfillment::FulfillmentError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Error raised by a fulfillment service.
    Fulfillment(FulfillmentError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, error_body(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, error_body(msg)),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, error_body(msg))
            }
        };

        let mut response = (status, axum::Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

fn error_body(message: String) -> serde_json::Value {
    serde_json::json!({ "error": message })
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, serde_json::Value) {
    let message = err.to_string();
    match err {
        FulfillmentError::NotFound { .. }
        | FulfillmentError::Coupon(CouponError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, error_body(message))
        }
        FulfillmentError::Forbidden(_) => (StatusCode::FORBIDDEN, error_body(message)),
        FulfillmentError::Validation(_) | FulfillmentError::EmptyCart => {
            (StatusCode::BAD_REQUEST, error_body(message))
        }
        FulfillmentError::InvalidCart(issues) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            serde_json::json!({ "error": message, "issues": issues }),
        ),
        FulfillmentError::Coupon(_) => (StatusCode::UNPROCESSABLE_ENTITY, error_body(message)),
        FulfillmentError::InsufficientStock {
            available,
            requested,
            ..
        } => (
            StatusCode::CONFLICT,
            serde_json::json!({
                "error": message,
                "available": available,
                "requested": requested,
            }),
        ),
        FulfillmentError::InvalidStateTransition { .. }
        | FulfillmentError::NegativeStock(_)
        | FulfillmentError::Conflict(_) => (StatusCode::CONFLICT, error_body(message)),
        FulfillmentError::Timeout { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({ "error": message, "retryable": true }),
        ),
        FulfillmentError::Store(_) => {
            tracing::error!(error = %message, "store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                error_body("internal error".to_string()),
            )
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}
