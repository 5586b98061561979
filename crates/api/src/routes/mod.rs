//! HTTP handlers grouped by resource.

pub mod carts;
pub mod coupons;
pub mod ops;
pub mod orders;
pub mod reservations;
pub mod stock;

use fulfillment::OrderFulfillment;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub fulfillment: OrderFulfillment<S>,
}
