//! Domain error types.

use thiserror::Error;

use crate::cart::CartError;
use crate::coupon::CouponError;
use crate::order::OrderError;
use crate::reservation::ReservationError;
use crate::stock::StockError;

/// Errors raised by domain rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Stock error: {0}")]
    Stock(#[from] StockError),

    #[error("Reservation error: {0}")]
    Reservation(#[from] ReservationError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),
}

/// A persisted status string did not name a known status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind} status: {value}")]
pub struct ParseStatusError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseStatusError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
