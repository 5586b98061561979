//! Fulfillment error types.

use std::future::Future;
use std::time::Duration;

use domain::{
    CartError, CheckoutIssue, CouponError, DomainError, OrderError, ReservationError, StockError,
    StockKey,
};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the fulfillment services.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    /// The cart failed its pre-checkout consistency check.
    #[error("Cart is not valid for checkout ({} issue(s))", .0.len())]
    InvalidCart(Vec<CheckoutIssue>),

    #[error("Insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: StockKey,
        available: u32,
        requested: u32,
    },

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Coupon rejected: {0}")]
    Coupon(CouponError),

    #[error("Stock adjustment rejected: {0}")]
    NegativeStock(StockError),

    /// Another writer changed the row between read and write.
    #[error("Concurrent update: {0}")]
    Conflict(String),

    /// The call did not finish in time. Its effect is unknown to the caller.
    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl FulfillmentError {
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        FulfillmentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for infrastructure failures worth retrying later; false for
    /// business rejections.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FulfillmentError::Timeout { .. } | FulfillmentError::Conflict(_)
        )
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => FulfillmentError::NotFound { entity, id },
            StoreError::Conflict { entity, id } => {
                FulfillmentError::Conflict(format!("{entity} {id}"))
            }
            StoreError::Timeout => FulfillmentError::Timeout { operation: "store" },
            StoreError::Domain(err) => err.into(),
            other => FulfillmentError::Store(other),
        }
    }
}

impl From<DomainError> for FulfillmentError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Stock(err) => err.into(),
            DomainError::Reservation(err) => err.into(),
            DomainError::Order(err) => err.into(),
            DomainError::Coupon(err) => FulfillmentError::Coupon(err),
            DomainError::Cart(err) => err.into(),
        }
    }
}

impl From<StockError> for FulfillmentError {
    fn from(err: StockError) -> Self {
        match err {
            StockError::InsufficientStock {
                key,
                available,
                requested,
            } => FulfillmentError::InsufficientStock {
                key,
                available,
                requested,
            },
            StockError::InvalidQuantity { .. } => FulfillmentError::Validation(err.to_string()),
            StockError::NegativeStock { .. } => FulfillmentError::NegativeStock(err),
        }
    }
}

impl From<ReservationError> for FulfillmentError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::InvalidStateTransition { from, to } => {
                FulfillmentError::InvalidStateTransition {
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            ReservationError::NoLines | ReservationError::InvalidQuantity { .. } => {
                FulfillmentError::Validation(err.to_string())
            }
        }
    }
}

impl From<OrderError> for FulfillmentError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidStateTransition {
                current_state,
                action,
            } => FulfillmentError::InvalidStateTransition {
                from: current_state.to_string(),
                to: action.to_string(),
            },
            OrderError::PaymentAlreadySettled { status } => {
                FulfillmentError::InvalidStateTransition {
                    from: format!("payment {status}"),
                    to: "settle payment".to_string(),
                }
            }
            OrderError::NoItems => FulfillmentError::EmptyCart,
        }
    }
}

impl From<CartError> for FulfillmentError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::Empty => FulfillmentError::EmptyCart,
            CartError::InvalidQuantity { .. } => FulfillmentError::Validation(err.to_string()),
            CartError::ItemNotFound { key } => FulfillmentError::not_found("cart item", key),
        }
    }
}

impl From<CouponError> for FulfillmentError {
    fn from(err: CouponError) -> Self {
        FulfillmentError::Coupon(err)
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

/// Awaits `call`, giving up after `limit`.
///
/// The store's own statement timeout is the primary bound; this catches a
/// hung connection pool or collaborator.
pub(crate) async fn bounded<T, E>(
    operation: &'static str,
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    E: Into<FulfillmentError>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            metrics::counter!("fulfillment_call_timeouts_total", "operation" => operation)
                .increment(1);
            tracing::warn!(operation, ?limit, "call timed out");
            Err(FulfillmentError::Timeout { operation })
        }
    }
}
