use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, CouponId, FollowUpId, OrderId, ReservationId, TenantId, UserId};
use domain::{
    Cart, Coupon, CouponCode, CouponError, MovementKind, MovementReference, Order, OrderError,
    OrderNumber, OrderStatus, Reservation, ReservationLine, ReservationStatus, StockError,
    StockKey, StockLevel, StockMovement,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    follow_up::FollowUpTask,
    store::{
        CartStore, CouponStore, FollowUpStore, OrderStore, OrderTransition, PaymentOutcome,
        ReservationStore, StockStore,
    },
};

#[derive(Debug, Default)]
struct State {
    stock: HashMap<StockKey, StockLevel>,
    movements: Vec<StockMovement>,
    // Insertion order, so the latest reservation for an order is found last.
    reservations: Vec<Reservation>,
    orders: HashMap<OrderId, Order>,
    order_sequences: HashMap<(TenantId, i32), u32>,
    carts: HashMap<CartId, Cart>,
    coupons: HashMap<CouponId, Coupon>,
    follow_ups: Vec<FollowUpTask>,
}

impl State {
    fn level(&self, key: StockKey) -> Result<StockLevel> {
        self.stock
            .get(&key)
            .copied()
            .ok_or_else(|| StoreError::not_found("stock", key))
    }

    /// Applies `op` to one stock level and logs the movement. Nothing is
    /// written if `op` fails.
    fn mutate_stock(
        &mut self,
        key: StockKey,
        kind: MovementKind,
        reference: MovementReference,
        op: impl FnOnce(&mut StockLevel) -> std::result::Result<(), StockError>,
    ) -> Result<StockLevel> {
        let before = self.level(key)?;
        let mut after = before;
        op(&mut after)?;
        self.stock.insert(key, after);
        self.movements
            .push(StockMovement::between(kind, &before, &after, reference));
        Ok(after)
    }

    /// Applies `op` to every line, all or nothing.
    fn mutate_lines(
        &mut self,
        lines: &[ReservationLine],
        kind: MovementKind,
        reference: &MovementReference,
        op: impl Fn(&mut StockLevel, u32) -> std::result::Result<(), StockError>,
    ) -> Result<()> {
        let mut staged: HashMap<StockKey, StockLevel> = HashMap::new();
        let mut movements = Vec::with_capacity(lines.len());
        for line in lines {
            let before = match staged.get(&line.key) {
                Some(level) => *level,
                None => self.level(line.key)?,
            };
            let mut after = before;
            op(&mut after, line.quantity)?;
            staged.insert(line.key, after);
            movements.push(StockMovement::between(
                kind,
                &before,
                &after,
                reference.clone(),
            ));
        }
        self.stock.extend(staged);
        self.movements.extend(movements);
        Ok(())
    }

    fn latest_reservation(&self, order_id: OrderId) -> Option<&Reservation> {
        self.reservations
            .iter()
            .rev()
            .find(|r| r.order_id == order_id)
    }

    fn store_reservation(&mut self, reservation: Reservation) {
        match self.reservations.iter_mut().find(|r| r.id == reservation.id) {
            Some(existing) => *existing = reservation,
            None => self.reservations.push(reservation),
        }
    }

    fn order(&self, id: OrderId) -> Result<Order> {
        self.orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", id))
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_on_reserve: AtomicBool,
    fail_on_coupon_usage: AtomicBool,
    fail_on_place_order: AtomicBool,
}

impl Faults {
    fn check(flag: &AtomicBool) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        Ok(())
    }
}

/// In-memory store implementation for testing.
///
/// Every composite operation runs under a single write lock, giving the same
/// all-or-nothing behaviour as the PostgreSQL transactions. The lock is
/// never held across a caller's await point.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    faults: Arc<Faults>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `reserve_stock` fail with a timeout.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.faults.fail_on_reserve.store(fail, Ordering::SeqCst);
    }

    /// Makes `increment_coupon_usage` fail with a timeout.
    pub fn set_fail_on_coupon_usage(&self, fail: bool) {
        self.faults.fail_on_coupon_usage.store(fail, Ordering::SeqCst);
    }

    /// Makes `place_order` fail with a timeout.
    pub fn set_fail_on_place_order(&self, fail: bool) {
        self.faults.fail_on_place_order.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of persisted orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the total number of movement log entries.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }

    /// Clears all data.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

#[async_trait]
impl StockStore for InMemoryStore {
    async fn stock_level(&self, key: StockKey) -> Result<Option<StockLevel>> {
        Ok(self.state.read().await.stock.get(&key).copied())
    }

    async fn put_stock(&self, key: StockKey, quantity: u32) -> Result<StockLevel> {
        let mut state = self.state.write().await;
        let reference = MovementReference::reason("stock level set");
        let current = match state.stock.get(&key) {
            Some(level) => *level,
            None => {
                let empty = StockLevel::new(key, 0);
                state.stock.insert(key, empty);
                empty
            }
        };
        let delta = i64::from(quantity) - i64::from(current.quantity());
        if delta == 0 {
            return Ok(current);
        }
        state.mutate_stock(key, MovementKind::ManualAdjustment, reference, |level| {
            level.adjust(delta)
        })
    }

    async fn reserve_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        Faults::check(&self.faults.fail_on_reserve)?;
        self.state
            .write()
            .await
            .mutate_stock(key, MovementKind::Reservation, reference, |level| {
                level.reserve(quantity)
            })
    }

    async fn release_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        self.state
            .write()
            .await
            .mutate_stock(key, MovementKind::Release, reference, |level| {
                level.release(quantity)
            })
    }

    async fn confirm_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        self.state
            .write()
            .await
            .mutate_stock(key, MovementKind::Confirmation, reference, |level| {
                level.confirm(quantity)
            })
    }

    async fn adjust_stock(
        &self,
        key: StockKey,
        delta: i64,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        self.state
            .write()
            .await
            .mutate_stock(key, MovementKind::ManualAdjustment, reference, |level| {
                level.adjust(delta)
            })
    }

    async fn movements(&self, key: StockKey) -> Result<Vec<StockMovement>> {
        let state = self.state.read().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.key == key)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        if state.reservations.iter().any(|r| r.id == reservation.id) {
            return Err(StoreError::conflict("reservation", reservation.id));
        }
        if let Some(order) = state.orders.get(&reservation.order_id) {
            OrderError::check_reservable(order.status())?;
        }
        state.reservations.push(reservation.clone());
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let state = self.state.read().await;
        Ok(state.reservations.iter().find(|r| r.id == id).cloned())
    }

    async fn reservation_for_order(&self, order_id: OrderId) -> Result<Option<Reservation>> {
        Ok(self.state.read().await.latest_reservation(order_id).cloned())
    }

    async fn confirm_reservation(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut state = self.state.write().await;
        let mut reservation = state
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("reservation", id))?;

        reservation.confirm(at)?;
        let reference = MovementReference::reservation(reservation.order_id, id);
        state.mutate_lines(
            reservation.lines(),
            MovementKind::Confirmation,
            &reference,
            StockLevel::confirm,
        )?;
        state.store_reservation(reservation.clone());
        Ok(reservation)
    }

    async fn cancel_reservation(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut state = self.state.write().await;
        let mut reservation = state
            .reservations
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("reservation", id))?;

        reservation.cancel(at)?;
        let reference = MovementReference::reservation(reservation.order_id, id);
        state.mutate_lines(
            reservation.lines(),
            MovementKind::Release,
            &reference,
            StockLevel::release,
        )?;
        state.store_reservation(reservation.clone());
        Ok(reservation)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn next_order_number(&self, tenant_id: TenantId, year: i32) -> Result<OrderNumber> {
        let mut state = self.state.write().await;
        let sequence = state.order_sequences.entry((tenant_id, year)).or_insert(0);
        *sequence += 1;
        Ok(OrderNumber::new(year, *sequence))
    }

    async fn place_order(&self, order: &Order, cart_id: CartId) -> Result<()> {
        Faults::check(&self.faults.fail_on_place_order)?;
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::conflict("order", order.id));
        }
        let cart = state
            .carts
            .get_mut(&cart_id)
            .ok_or_else(|| StoreError::not_found("cart", cart_id))?;
        cart.clear();
        state.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn cancel_order(&self, id: OrderId, at: DateTime<Utc>) -> Result<OrderTransition> {
        let mut state = self.state.write().await;
        let mut order = state.order(id)?;
        order.cancel(at)?;

        let mut reservation = state.latest_reservation(id).cloned();
        if let Some(reservation) = reservation.as_mut() {
            let reference = MovementReference::reservation(id, reservation.id)
                .with_reason("order cancelled");
            match reservation.status() {
                ReservationStatus::Reserved => {
                    reservation.cancel(at)?;
                    state.mutate_lines(
                        reservation.lines(),
                        MovementKind::Release,
                        &reference,
                        StockLevel::release,
                    )?;
                }
                ReservationStatus::Confirmed => {
                    state.mutate_lines(
                        reservation.lines(),
                        MovementKind::Restock,
                        &reference,
                        StockLevel::restock,
                    )?;
                }
                ReservationStatus::Cancelled => {}
            }
            state.store_reservation(reservation.clone());
        }

        state.orders.insert(id, order.clone());
        Ok(OrderTransition { order, reservation })
    }

    async fn settle_payment(
        &self,
        id: OrderId,
        outcome: PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<OrderTransition> {
        let mut state = self.state.write().await;
        let mut order = state.order(id)?;
        let mut reservation = state.latest_reservation(id).cloned();

        match outcome {
            PaymentOutcome::Completed { reference } => {
                order.mark_paid(reference, at)?;
                let held = reservation
                    .as_mut()
                    .ok_or_else(|| StoreError::not_found("reservation for order", id))?;
                held.confirm(at)?;
                state.mutate_lines(
                    held.lines(),
                    MovementKind::Confirmation,
                    &MovementReference::reservation(id, held.id),
                    StockLevel::confirm,
                )?;
            }
            PaymentOutcome::Failed => {
                order.mark_payment_failed(at)?;
                if let Some(held) = reservation.as_mut()
                    && held.status().can_cancel()
                {
                    held.cancel(at)?;
                    state.mutate_lines(
                        held.lines(),
                        MovementKind::Release,
                        &MovementReference::reservation(id, held.id)
                            .with_reason("payment failed"),
                        StockLevel::release,
                    )?;
                }
            }
        }

        if let Some(held) = &reservation {
            state.store_reservation(held.clone());
        }
        state.orders.insert(id, order.clone());
        Ok(OrderTransition { order, reservation })
    }

    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::not_found("order", order.id))?;
        if stored.status() != expected {
            return Err(StoreError::conflict("order", order.id));
        }
        *stored = order.clone();
        Ok(())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart(&self, id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&id).cloned())
    }

    async fn active_cart(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .carts
            .values()
            .find(|c| c.tenant_id == tenant_id && c.user_id == user_id)
            .cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut state = self.state.write().await;
        let duplicate = state.carts.values().any(|c| {
            c.id != cart.id && c.tenant_id == cart.tenant_id && c.user_id == cart.user_id
        });
        if duplicate {
            return Err(StoreError::conflict("cart", cart.id));
        }
        state.carts.insert(cart.id, cart.clone());
        Ok(())
    }
}

#[async_trait]
impl CouponStore for InMemoryStore {
    async fn coupon_by_code(
        &self,
        tenant_id: TenantId,
        code: &CouponCode,
    ) -> Result<Option<Coupon>> {
        let state = self.state.read().await;
        Ok(state
            .coupons
            .values()
            .find(|c| c.tenant_id == tenant_id && &c.code == code)
            .cloned())
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut state = self.state.write().await;
        let duplicate = state.coupons.values().any(|c| {
            c.id != coupon.id && c.tenant_id == coupon.tenant_id && c.code == coupon.code
        });
        if duplicate {
            return Err(StoreError::conflict("coupon", &coupon.code));
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }

    async fn increment_coupon_usage(&self, id: CouponId) -> Result<Coupon> {
        Faults::check(&self.faults.fail_on_coupon_usage)?;
        let mut state = self.state.write().await;
        let coupon = state
            .coupons
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("coupon", id))?;
        if coupon.usage_exhausted() {
            return Err(CouponError::UsageLimitReached {
                code: coupon.code.clone(),
            }
            .into());
        }
        coupon.used_count += 1;
        Ok(coupon.clone())
    }
}

#[async_trait]
impl FollowUpStore for InMemoryStore {
    async fn enqueue_follow_up(&self, task: &FollowUpTask) -> Result<()> {
        self.state.write().await.follow_ups.push(task.clone());
        Ok(())
    }

    async fn pending_follow_ups(&self, limit: usize) -> Result<Vec<FollowUpTask>> {
        let state = self.state.read().await;
        let mut tasks = state.follow_ups.clone();
        tasks.sort_by_key(|t| t.created_at);
        tasks.truncate(limit);
        Ok(tasks)
    }

    async fn complete_follow_up(&self, id: FollowUpId) -> Result<()> {
        self.state.write().await.follow_ups.retain(|t| t.id != id);
        Ok(())
    }

    async fn record_follow_up_failure(&self, id: FollowUpId, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .follow_ups
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::not_found("follow-up task", id))?;
        task.attempts += 1;
        task.last_error = Some(error.to_string());
        Ok(())
    }
}
