//! Stock ledger arithmetic and the stock movement record.

mod level;
mod movement;

pub use level::{StockKey, StockLevel};
pub use movement::{MovementKind, MovementReference, StockMovement};

use thiserror::Error;

/// Errors produced by ledger arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockError {
    /// Quantities passed to ledger operations must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Not enough unreserved stock to satisfy the request.
    #[error("Insufficient stock for {key}: available {available}, requested {requested}")]
    InsufficientStock {
        key: StockKey,
        available: u32,
        requested: u32,
    },

    /// A manual adjustment would leave on-hand stock negative or below
    /// what is already reserved.
    #[error(
        "Adjustment of {delta} for {key} would leave quantity below zero or below reserved (quantity {quantity}, reserved {reserved})"
    )]
    NegativeStock {
        key: StockKey,
        quantity: u32,
        reserved: u32,
        delta: i64,
    },
}
