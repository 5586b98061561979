use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CouponId, FollowUpId, OrderId, ReservationId, TenantId, UserId};
use domain::{
    Cart, Coupon, CouponCode, MovementReference, Order, OrderNumber, OrderStatus, Reservation,
    StockKey, StockLevel, StockMovement,
};

use crate::Result;
use crate::follow_up::FollowUpTask;

/// Durable stock levels and the append-only movement log.
///
/// Every mutating call is a single atomic check-and-write: the rule is
/// evaluated against the committed row and the movement entry is written in
/// the same transaction, so concurrent callers can never oversell.
#[async_trait]
pub trait StockStore: Send + Sync {
    /// Returns the current level, or None if the key has no stock record.
    async fn stock_level(&self, key: StockKey) -> Result<Option<StockLevel>>;

    /// Creates or overwrites the on-hand quantity of a stock record.
    ///
    /// Keeps any existing `reserved` amount. Fails with `NegativeStock` if
    /// `quantity` is below what is already reserved.
    async fn put_stock(&self, key: StockKey, quantity: u32) -> Result<StockLevel>;

    /// Claims `quantity` units if at least that many are available.
    async fn reserve_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel>;

    /// Returns claimed units to the available pool, flooring `reserved` at 0.
    async fn release_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel>;

    /// Deducts `quantity` from both on-hand and reserved.
    async fn confirm_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel>;

    /// Admin correction of on-hand stock.
    async fn adjust_stock(
        &self,
        key: StockKey,
        delta: i64,
        reference: MovementReference,
    ) -> Result<StockLevel>;

    /// Movement log for a key, oldest first.
    async fn movements(&self, key: StockKey) -> Result<Vec<StockMovement>>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Persists a reservation whose stock has already been claimed.
    ///
    /// Fails with `OrderError::InvalidStateTransition` if the order exists
    /// and is no longer Pending. The status check and the insert are atomic
    /// with respect to order transitions.
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// The most recent reservation made for an order.
    async fn reservation_for_order(&self, order_id: OrderId) -> Result<Option<Reservation>>;

    /// Confirms every line and marks the reservation Confirmed, all or nothing.
    async fn confirm_reservation(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Reservation>;

    /// Releases every line and marks the reservation Cancelled, all or nothing.
    async fn cancel_reservation(&self, id: ReservationId, at: DateTime<Utc>)
    -> Result<Reservation>;
}

/// Outcome reported by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed { reference: String },
    Failed,
}

/// An order after a stock-affecting transition, with the reservation it
/// touched (if the order had one).
#[derive(Debug, Clone)]
pub struct OrderTransition {
    pub order: Order,
    pub reservation: Option<Reservation>,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Atomically increments and returns the per-(tenant, year) sequence.
    async fn next_order_number(&self, tenant_id: TenantId, year: i32) -> Result<OrderNumber>;

    /// Inserts the order with its lines and empties the cart in one
    /// transaction.
    async fn place_order(&self, order: &Order, cart_id: CartId) -> Result<()>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Cancels an order and puts its stock back in one transaction.
    ///
    /// A Reserved reservation is released and marked Cancelled; a Confirmed
    /// one has its quantities restocked.
    async fn cancel_order(&self, id: OrderId, at: DateTime<Utc>) -> Result<OrderTransition>;

    /// Settles payment in one transaction. Completion confirms the
    /// reservation and starts processing; failure releases it and cancels
    /// the order.
    async fn settle_payment(
        &self,
        id: OrderId,
        outcome: PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<OrderTransition>;

    /// Writes a status change made on `order`, provided the stored status
    /// still matches `expected`.
    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> Result<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart(&self, id: CartId) -> Result<Option<Cart>>;

    /// The single active cart of a user within a tenant.
    async fn active_cart(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<Cart>>;

    /// Creates or replaces a cart and all of its items.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
}

#[async_trait]
pub trait CouponStore: Send + Sync {
    async fn coupon_by_code(&self, tenant_id: TenantId, code: &CouponCode)
    -> Result<Option<Coupon>>;

    async fn save_coupon(&self, coupon: &Coupon) -> Result<()>;

    /// Adds one use, refusing with `UsageLimitReached` once `max_uses` is hit.
    async fn increment_coupon_usage(&self, id: CouponId) -> Result<Coupon>;
}

#[async_trait]
pub trait FollowUpStore: Send + Sync {
    async fn enqueue_follow_up(&self, task: &FollowUpTask) -> Result<()>;

    /// Oldest tasks first.
    async fn pending_follow_ups(&self, limit: usize) -> Result<Vec<FollowUpTask>>;

    async fn complete_follow_up(&self, id: FollowUpId) -> Result<()>;

    async fn record_follow_up_failure(&self, id: FollowUpId, error: &str) -> Result<()>;
}

/// Everything the fulfillment services need from persistence.
pub trait CommerceStore:
    StockStore + ReservationStore + OrderStore + CartStore + CouponStore + FollowUpStore
{
}

impl<T> CommerceStore for T where
    T: StockStore + ReservationStore + OrderStore + CartStore + CouponStore + FollowUpStore
{
}
