//! Domain layer for the inventory reservation and order fulfillment engine.
//!
//! This crate is free of I/O. It provides:
//! - Stock levels, ledger arithmetic and the stock movement record
//! - The reservation state machine
//! - Carts, checkout validation reports and price drift detection
//! - Coupon rules and discount calculation
//! - Orders, order numbering and pricing policy

pub mod cart;
pub mod catalog;
pub mod coupon;
pub mod error;
pub mod order;
pub mod reservation;
pub mod stock;

pub use cart::{Cart, CartError, CartItem, CartValidation, CheckoutIssue, IssueKind, LineFacts};
pub use catalog::{Address, ProductSnapshot, VariantSnapshot};
pub use coupon::{Coupon, CouponCode, CouponDiscount, CouponError};
pub use error::{DomainError, ParseStatusError};
pub use order::{
    Order, OrderDraft, OrderError, OrderLine, OrderNumber, OrderRecord, OrderStatus, OrderTotals,
    ParseOrderNumberError, PaymentStatus, PricingPolicy,
};
pub use reservation::{Reservation, ReservationError, ReservationLine, ReservationStatus};
pub use stock::{
    MovementKind, MovementReference, StockError, StockKey, StockLevel, StockMovement,
};
