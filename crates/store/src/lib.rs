//! Transactional persistence for the stock ledger, reservations, carts,
//! coupons and orders.
//!
//! Two implementations share the traits in [`store`]:
//! - [`InMemoryStore`] for tests and local runs
//! - [`PostgresStore`] backed by sqlx, where every composite operation is one
//!   transaction bounded by `statement_timeout`

pub mod error;
pub mod follow_up;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use follow_up::{FollowUpKind, FollowUpTask};
pub use memory::InMemoryStore;
pub use postgres::{DEFAULT_STATEMENT_TIMEOUT, PostgresStore};
pub use store::{
    CartStore, CommerceStore, CouponStore, FollowUpStore, OrderStore, OrderTransition,
    PaymentOutcome, ReservationStore, StockStore,
};
