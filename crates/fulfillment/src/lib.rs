//! Inventory reservation and order fulfillment services.
//!
//! The services in this crate sit between the HTTP layer and persistence:
//! - [`StockLedger`]: reserve, release, confirm and adjust stock per key
//! - [`ReservationManager`]: all-or-nothing reservations tied to an order
//! - [`CouponEngine`]: coupon lookup, validation and usage accounting
//! - [`CartService`] and [`CartValidator`]: cart mutations and the
//!   pre-checkout consistency check
//! - [`OrderFulfillment`]: checkout, payment settlement, shipping and
//!   cancellation, plus replay of queued follow-up work
//!
//! Every store and collaborator call is bounded by a timeout; see
//! [`DEFAULT_CALL_TIMEOUT`].

use std::time::Duration;

pub mod cart;
pub mod coupons;
pub mod error;
pub mod follow_ups;
pub mod ledger;
pub mod orders;
pub mod reservations;
pub mod services;

pub use cart::{CartService, CartValidator};
pub use coupons::CouponEngine;
pub use error::{FulfillmentError, Result};
pub use follow_ups::FollowUpReport;
pub use ledger::StockLedger;
pub use orders::{CheckoutOutcome, CreateOrder, OrderFulfillment};
pub use reservations::ReservationManager;
pub use services::{
    AddressBook, AuditEvent, AuditSink, Catalog, Collaborators, InMemoryAddressBook,
    InMemoryAuditSink, InMemoryCatalog, InMemoryTenantGuard, TenantGuard, TracingAuditSink,
};

/// Upper bound on a single store or collaborator call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);
