use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    CartId, CouponId, FollowUpId, Money, MovementId, OrderId, ProductId, ReservationId, TenantId,
    UserId, VariantId,
};
use domain::{
    Address, Cart, CartItem, Coupon, CouponCode, CouponDiscount, CouponError, MovementKind,
    MovementReference, Order, OrderDraft, OrderError, OrderLine, OrderNumber, OrderRecord,
    OrderStatus, OrderTotals, PaymentStatus, Reservation, ReservationLine, ReservationStatus,
    StockError, StockKey, StockLevel, StockMovement,
};
use futures_util::TryStreamExt;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    follow_up::{FollowUpKind, FollowUpTask},
    store::{
        CartStore, CouponStore, FollowUpStore, OrderStore, OrderTransition, PaymentOutcome,
        ReservationStore, StockStore,
    },
};

/// Default upper bound for any single statement.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A conditional ledger update: `set` is applied only where `guard` holds.
/// `$3` is the amount; `s` is the row before the update.
struct LedgerUpdate {
    set: &'static str,
    guard: &'static str,
}

const RESERVE: LedgerUpdate = LedgerUpdate {
    set: "reserved = s.reserved + $3",
    guard: "s.quantity - s.reserved >= $3",
};

const RELEASE: LedgerUpdate = LedgerUpdate {
    set: "reserved = GREATEST(s.reserved - $3, 0)",
    guard: "TRUE",
};

const CONFIRM: LedgerUpdate = LedgerUpdate {
    set: "quantity = s.quantity - $3, reserved = GREATEST(s.reserved - $3, 0)",
    guard: "s.quantity >= $3",
};

const RESTOCK: LedgerUpdate = LedgerUpdate {
    set: "quantity = s.quantity + $3",
    guard: "TRUE",
};

const ADJUST: LedgerUpdate = LedgerUpdate {
    set: "quantity = s.quantity + $3",
    guard: "s.quantity + $3 >= s.reserved",
};

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
        }
    }

    /// Connects a pool of at most `max_connections` to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Sets the `statement_timeout` applied to every transaction.
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Opens a transaction bounded by the configured statement timeout.
    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters.
        let set_timeout = format!(
            "SET LOCAL statement_timeout = {}",
            self.statement_timeout.as_millis()
        );
        sqlx::query(&set_timeout).execute(&mut *tx).await?;
        Ok(tx)
    }

    async fn apply_ledger(
        conn: &mut PgConnection,
        key: StockKey,
        update: &LedgerUpdate,
        amount: i64,
        kind: MovementKind,
        reference: MovementReference,
        rule: impl FnOnce(&mut StockLevel) -> std::result::Result<(), StockError>,
    ) -> Result<StockLevel> {
        if amount == 0 {
            return Err(StockError::InvalidQuantity { quantity: 0 }.into());
        }

        let sql = format!(
            r#"
            WITH prev AS (
                SELECT quantity, reserved FROM stock_levels
                WHERE product_id = $1 AND variant_id = $2
                FOR UPDATE
            )
            UPDATE stock_levels AS s
            SET {}, updated_at = NOW()
            FROM prev
            WHERE s.product_id = $1 AND s.variant_id = $2 AND {}
            RETURNING prev.quantity AS quantity_before, prev.reserved AS reserved_before,
                      s.quantity, s.reserved
            "#,
            update.set, update.guard
        );

        let row: Option<PgRow> = sqlx::query(&sql)
            .bind(key.product_id.as_uuid())
            .bind(variant_column(&key))
            .bind(amount)
            .fetch_optional(&mut *conn)
            .await?;

        let Some(row) = row else {
            // Nothing matched: report why using the committed row.
            let mut level = Self::fetch_level(&mut *conn, key)
                .await?
                .ok_or_else(|| StoreError::not_found("stock", key))?;
            rule(&mut level)?;
            tracing::debug!(%key, ?kind, "ledger guard rejected update the domain rule allows");
            return Err(StoreError::conflict("stock", key));
        };

        let before = StockLevel::from_parts(
            key,
            u32_col(&row, "quantity_before")?,
            u32_col(&row, "reserved_before")?,
        );
        let after = StockLevel::from_parts(key, u32_col(&row, "quantity")?, u32_col(&row, "reserved")?);
        let movement = StockMovement::between(kind, &before, &after, reference);
        Self::insert_movement(&mut *conn, &movement).await?;
        Ok(after)
    }

    async fn fetch_level(conn: &mut PgConnection, key: StockKey) -> Result<Option<StockLevel>> {
        let row: Option<PgRow> = sqlx::query(
            "SELECT quantity, reserved FROM stock_levels WHERE product_id = $1 AND variant_id = $2",
        )
        .bind(key.product_id.as_uuid())
        .bind(variant_column(&key))
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok(Some(StockLevel::from_parts(
                key,
                u32_col(&row, "quantity")?,
                u32_col(&row, "reserved")?,
            ))),
            None => Ok(None),
        }
    }

    async fn insert_movement(conn: &mut PgConnection, movement: &StockMovement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (id, product_id, variant_id, kind, quantity_delta,
                reserved_delta, quantity_after, reserved_after, order_id, reservation_id,
                reason, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(movement.id.as_uuid())
        .bind(movement.key.product_id.as_uuid())
        .bind(variant_column(&movement.key))
        .bind(movement.kind.as_str())
        .bind(movement.quantity_delta)
        .bind(movement.reserved_delta)
        .bind(i64::from(movement.quantity_after))
        .bind(i64::from(movement.reserved_after))
        .bind(movement.reference.order_id.map(Uuid::from))
        .bind(movement.reference.reservation_id.map(Uuid::from))
        .bind(movement.reference.reason.as_deref())
        .bind(movement.recorded_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Applies one ledger update per line inside the caller's transaction.
    async fn apply_lines(
        conn: &mut PgConnection,
        lines: &[ReservationLine],
        update: &LedgerUpdate,
        kind: MovementKind,
        reference: &MovementReference,
        rule: fn(&mut StockLevel, u32) -> std::result::Result<(), StockError>,
    ) -> Result<()> {
        for line in lines {
            Self::apply_ledger(
                &mut *conn,
                line.key,
                update,
                i64::from(line.quantity),
                kind,
                reference.clone(),
                |level| rule(level, line.quantity),
            )
            .await?;
        }
        Ok(())
    }

    fn row_to_movement(row: &PgRow) -> Result<StockMovement> {
        let kind: String = row.try_get("kind")?;
        Ok(StockMovement {
            id: MovementId::from_uuid(row.try_get("id")?),
            key: key_from_columns(row.try_get("product_id")?, row.try_get("variant_id")?),
            kind: kind.parse()?,
            quantity_delta: row.try_get("quantity_delta")?,
            reserved_delta: row.try_get("reserved_delta")?,
            quantity_after: u32_col(row, "quantity_after")?,
            reserved_after: u32_col(row, "reserved_after")?,
            reference: MovementReference {
                order_id: row.try_get::<Option<Uuid>, _>("order_id")?.map(OrderId::from),
                reservation_id: row
                    .try_get::<Option<Uuid>, _>("reservation_id")?
                    .map(ReservationId::from),
                reason: row.try_get("reason")?,
            },
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    async fn load_reservation(
        conn: &mut PgConnection,
        id: ReservationId,
        for_update: bool,
    ) -> Result<Option<Reservation>> {
        let sql = if for_update {
            "SELECT id, order_id, status, created_at, confirmed_at, cancelled_at FROM reservations WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT id, order_id, status, created_at, confirmed_at, cancelled_at FROM reservations WHERE id = $1"
        };
        let Some(row) = sqlx::query(sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };

        let lines = sqlx::query(
            r#"
            SELECT product_id, variant_id, quantity FROM reservation_lines
            WHERE reservation_id = $1
            ORDER BY product_id, variant_id
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|line| {
            Ok(ReservationLine::new(
                key_from_columns(line.try_get("product_id")?, line.try_get("variant_id")?),
                u32_col(line, "quantity")?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

        let status: String = row.try_get("status")?;
        Ok(Some(Reservation::restore(
            id,
            OrderId::from_uuid(row.try_get("order_id")?),
            status.parse::<ReservationStatus>()?,
            lines,
            row.try_get("created_at")?,
            row.try_get("confirmed_at")?,
            row.try_get("cancelled_at")?,
        )))
    }

    async fn latest_reservation(
        conn: &mut PgConnection,
        order_id: OrderId,
        for_update: bool,
    ) -> Result<Option<Reservation>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            "SELECT id FROM reservations WHERE order_id = $1 ORDER BY seq DESC LIMIT 1",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *conn)
        .await?;

        match id {
            Some(id) => {
                Self::load_reservation(&mut *conn, ReservationId::from_uuid(id), for_update).await
            }
            None => Ok(None),
        }
    }

    async fn write_reservation_status(
        conn: &mut PgConnection,
        reservation: &Reservation,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE reservations SET status = $2, confirmed_at = $3, cancelled_at = $4 WHERE id = $1",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.status().as_str())
        .bind(reservation.confirmed_at())
        .bind(reservation.cancelled_at())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn load_order(
        conn: &mut PgConnection,
        id: OrderId,
        for_update: bool,
    ) -> Result<Option<Order>> {
        let sql = if for_update {
            "SELECT * FROM orders WHERE id = $1 FOR UPDATE"
        } else {
            "SELECT * FROM orders WHERE id = $1"
        };
        let Some(row) = sqlx::query(sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };

        let lines = sqlx::query(
            r#"
            SELECT product_id, variant_id, quantity, price_at_purchase FROM order_items
            WHERE order_id = $1
            ORDER BY position
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|line| {
            Ok(OrderLine {
                product_id: ProductId::from_uuid(line.try_get("product_id")?),
                variant_id: line
                    .try_get::<Option<Uuid>, _>("variant_id")?
                    .map(VariantId::from),
                quantity: u32_col(line, "quantity")?,
                price_at_purchase: Money::from_cents(line.try_get("price_at_purchase")?),
            })
        })
        .collect::<Result<Vec<_>>>()?;

        let order_number: String = row.try_get("order_number")?;
        let status: String = row.try_get("status")?;
        let payment_status: String = row.try_get("payment_status")?;
        let draft = OrderDraft {
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            lines,
            totals: OrderTotals {
                subtotal: money_col(&row, "subtotal")?,
                shipping: money_col(&row, "shipping_cost")?,
                tax: money_col(&row, "tax")?,
                discount: money_col(&row, "discount")?,
                total: money_col(&row, "total")?,
            },
            coupon_code: row
                .try_get::<Option<String>, _>("coupon_code")?
                .map(CouponCode::new),
            shipping_address: row.try_get::<Json<Address>, _>("shipping_address")?.0,
            billing_address: row.try_get::<Json<Address>, _>("billing_address")?.0,
            payment_method: row.try_get("payment_method")?,
        };
        let record = OrderRecord {
            id,
            order_number: order_number
                .parse::<OrderNumber>()
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            status: status.parse::<OrderStatus>()?,
            payment_status: payment_status.parse::<PaymentStatus>()?,
            payment_reference: row.try_get("payment_reference")?,
            tracking_number: row.try_get("tracking_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        };
        Ok(Some(Order::restore(draft, record)))
    }

    async fn write_order_state(conn: &mut PgConnection, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, payment_reference = $4,
                tracking_number = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.payment_reference())
        .bind(order.tracking_number())
        .bind(order.updated_at())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn load_cart(conn: &mut PgConnection, id: CartId) -> Result<Option<Cart>> {
        let Some(row) = sqlx::query("SELECT tenant_id, user_id, updated_at FROM carts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(
            r#"
            SELECT product_id, variant_id, quantity, price_snapshot, added_at FROM cart_items
            WHERE cart_id = $1
            ORDER BY position
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|item| {
            Ok(CartItem {
                product_id: ProductId::from_uuid(item.try_get("product_id")?),
                variant_id: item
                    .try_get::<Option<Uuid>, _>("variant_id")?
                    .map(VariantId::from),
                quantity: u32_col(item, "quantity")?,
                price_snapshot: money_col(item, "price_snapshot")?,
                added_at: item.try_get("added_at")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Some(Cart::restore(
            id,
            TenantId::from_uuid(row.try_get("tenant_id")?),
            UserId::from_uuid(row.try_get("user_id")?),
            items,
            row.try_get("updated_at")?,
        )))
    }

    fn row_to_coupon(row: &PgRow) -> Result<Coupon> {
        let code: String = row.try_get("code")?;
        Ok(Coupon {
            id: CouponId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            code: CouponCode::new(code),
            discount: row.try_get::<Json<CouponDiscount>, _>("discount")?.0,
            max_discount: row.try_get::<Option<i64>, _>("max_discount")?.map(Money::from_cents),
            min_purchase: row.try_get::<Option<i64>, _>("min_purchase")?.map(Money::from_cents),
            max_uses: row
                .try_get::<Option<i32>, _>("max_uses")?
                .map(|v| to_u32(v, "max_uses"))
                .transpose()?,
            used_count: u32_col(row, "used_count")?,
            expires_at: row.try_get("expires_at")?,
            is_active: row.try_get("is_active")?,
        })
    }

    fn row_to_follow_up(row: &PgRow) -> Result<FollowUpTask> {
        Ok(FollowUpTask {
            id: FollowUpId::from_uuid(row.try_get("id")?),
            kind: row.try_get::<Json<FollowUpKind>, _>("kind")?.0,
            attempts: u32_col(row, "attempts")?,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl StockStore for PostgresStore {
    async fn stock_level(&self, key: StockKey) -> Result<Option<StockLevel>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_level(&mut conn, key).await
    }

    async fn put_stock(&self, key: StockKey, quantity: u32) -> Result<StockLevel> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO stock_levels (product_id, variant_id, quantity, reserved)
            VALUES ($1, $2, 0, 0)
            ON CONFLICT (product_id, variant_id) DO NOTHING
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(variant_column(&key))
        .execute(&mut *tx)
        .await?;

        let current = Self::fetch_level(&mut tx, key)
            .await?
            .ok_or_else(|| StoreError::not_found("stock", key))?;
        let delta = i64::from(quantity) - i64::from(current.quantity());
        let level = if delta == 0 {
            current
        } else {
            Self::apply_ledger(
                &mut tx,
                key,
                &ADJUST,
                delta,
                MovementKind::ManualAdjustment,
                MovementReference::reason("stock level set"),
                |level| level.adjust(delta),
            )
            .await?
        };
        tx.commit().await?;
        Ok(level)
    }

    async fn reserve_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        let mut tx = self.begin().await?;
        let level = Self::apply_ledger(
            &mut tx,
            key,
            &RESERVE,
            i64::from(quantity),
            MovementKind::Reservation,
            reference,
            |level| level.reserve(quantity),
        )
        .await?;
        tx.commit().await?;
        Ok(level)
    }

    async fn release_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        let mut tx = self.begin().await?;
        let level = Self::apply_ledger(
            &mut tx,
            key,
            &RELEASE,
            i64::from(quantity),
            MovementKind::Release,
            reference,
            |level| level.release(quantity),
        )
        .await?;
        tx.commit().await?;
        Ok(level)
    }

    async fn confirm_stock(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        let mut tx = self.begin().await?;
        let level = Self::apply_ledger(
            &mut tx,
            key,
            &CONFIRM,
            i64::from(quantity),
            MovementKind::Confirmation,
            reference,
            |level| level.confirm(quantity),
        )
        .await?;
        tx.commit().await?;
        Ok(level)
    }

    async fn adjust_stock(
        &self,
        key: StockKey,
        delta: i64,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        let mut tx = self.begin().await?;
        let level = Self::apply_ledger(
            &mut tx,
            key,
            &ADJUST,
            delta,
            MovementKind::ManualAdjustment,
            reference,
            |level| level.adjust(delta),
        )
        .await?;
        tx.commit().await?;
        Ok(level)
    }

    async fn movements(&self, key: StockKey) -> Result<Vec<StockMovement>> {
        let mut rows = sqlx::query(
            r#"
            SELECT * FROM stock_movements
            WHERE product_id = $1 AND variant_id = $2
            ORDER BY seq ASC
            "#,
        )
        .bind(key.product_id.as_uuid())
        .bind(variant_column(&key))
        .fetch(&self.pool);

        let mut movements = Vec::new();
        while let Some(row) = rows.try_next().await? {
            movements.push(Self::row_to_movement(&row)?);
        }
        Ok(movements)
    }
}

#[async_trait]
impl ReservationStore for PostgresStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.begin().await?;

        // Serializes with cancel/settle, which lock the same order row.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
                .bind(reservation.order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(status) = status {
            OrderError::check_reservable(status.parse::<OrderStatus>()?)?;
        }

        sqlx::query(
            r#"
            INSERT INTO reservations (id, order_id, status, created_at, confirmed_at, cancelled_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.order_id.as_uuid())
        .bind(reservation.status().as_str())
        .bind(reservation.created_at)
        .bind(reservation.confirmed_at())
        .bind(reservation.cancelled_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "reservations_pkey") {
                return StoreError::conflict("reservation", reservation.id);
            }
            StoreError::from(e)
        })?;

        for line in reservation.lines() {
            sqlx::query(
                r#"
                INSERT INTO reservation_lines (reservation_id, product_id, variant_id, quantity)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(reservation.id.as_uuid())
            .bind(line.key.product_id.as_uuid())
            .bind(variant_column(&line.key))
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_reservation(&mut conn, id, false).await
    }

    async fn reservation_for_order(&self, order_id: OrderId) -> Result<Option<Reservation>> {
        let mut conn = self.pool.acquire().await?;
        Self::latest_reservation(&mut conn, order_id, false).await
    }

    async fn confirm_reservation(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut tx = self.begin().await?;
        let mut reservation = Self::load_reservation(&mut tx, id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("reservation", id))?;

        reservation.confirm(at)?;
        Self::apply_lines(
            &mut tx,
            reservation.lines(),
            &CONFIRM,
            MovementKind::Confirmation,
            &MovementReference::reservation(reservation.order_id, id),
            StockLevel::confirm,
        )
        .await?;
        Self::write_reservation_status(&mut tx, &reservation).await?;
        tx.commit().await?;
        Ok(reservation)
    }

    async fn cancel_reservation(
        &self,
        id: ReservationId,
        at: DateTime<Utc>,
    ) -> Result<Reservation> {
        let mut tx = self.begin().await?;
        let mut reservation = Self::load_reservation(&mut tx, id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("reservation", id))?;

        reservation.cancel(at)?;
        Self::apply_lines(
            &mut tx,
            reservation.lines(),
            &RELEASE,
            MovementKind::Release,
            &MovementReference::reservation(reservation.order_id, id),
            StockLevel::release,
        )
        .await?;
        Self::write_reservation_status(&mut tx, &reservation).await?;
        tx.commit().await?;
        Ok(reservation)
    }
}

#[async_trait]
impl OrderStore for PostgresStore {
    async fn next_order_number(&self, tenant_id: TenantId, year: i32) -> Result<OrderNumber> {
        let mut tx = self.begin().await?;
        let sequence: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO order_sequences (tenant_id, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, year)
            DO UPDATE SET last_value = order_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(tenant_id.as_uuid())
        .bind(year)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(OrderNumber::new(year, to_u32(sequence, "last_value")?))
    }

    async fn place_order(&self, order: &Order, cart_id: CartId) -> Result<()> {
        let mut tx = self.begin().await?;

        let touched = sqlx::query("UPDATE carts SET updated_at = $2 WHERE id = $1")
            .bind(cart_id.as_uuid())
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::not_found("cart", cart_id));
        }

        sqlx::query(
            r#"
            INSERT INTO orders (id, tenant_id, user_id, order_number, status, payment_status,
                payment_method, payment_reference, tracking_number, subtotal, shipping_cost,
                tax, discount, total, coupon_code, shipping_address, billing_address,
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                $18, $19)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.tenant_id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.order_number.to_string())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(&order.payment_method)
        .bind(order.payment_reference())
        .bind(order.tracking_number())
        .bind(order.totals.subtotal.cents())
        .bind(order.totals.shipping.cents())
        .bind(order.totals.tax.cents())
        .bind(order.totals.discount.cents())
        .bind(order.totals.total.cents())
        .bind(order.coupon_code.as_ref().map(CouponCode::as_str))
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.billing_address))
        .bind(order.created_at)
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "unique_tenant_order_number")
                || is_unique_violation(&e, "orders_pkey")
            {
                return StoreError::conflict("order", order.order_number);
            }
            StoreError::from(e)
        })?;

        for (position, line) in order.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, variant_id, quantity,
                    price_at_purchase)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(position as i32)
            .bind(line.product_id.as_uuid())
            .bind(line.variant_id.map(Uuid::from))
            .bind(i64::from(line.quantity))
            .bind(line.price_at_purchase.cents())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_order(&mut conn, id, false).await
    }

    async fn cancel_order(&self, id: OrderId, at: DateTime<Utc>) -> Result<OrderTransition> {
        let mut tx = self.begin().await?;
        let mut order = Self::load_order(&mut tx, id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))?;
        order.cancel(at)?;

        let mut reservation = Self::latest_reservation(&mut tx, id, true).await?;
        if let Some(held) = reservation.as_mut() {
            let reference =
                MovementReference::reservation(id, held.id).with_reason("order cancelled");
            match held.status() {
                ReservationStatus::Reserved => {
                    held.cancel(at)?;
                    Self::apply_lines(
                        &mut tx,
                        held.lines(),
                        &RELEASE,
                        MovementKind::Release,
                        &reference,
                        StockLevel::release,
                    )
                    .await?;
                    Self::write_reservation_status(&mut tx, held).await?;
                }
                ReservationStatus::Confirmed => {
                    Self::apply_lines(
                        &mut tx,
                        held.lines(),
                        &RESTOCK,
                        MovementKind::Restock,
                        &reference,
                        StockLevel::restock,
                    )
                    .await?;
                }
                ReservationStatus::Cancelled => {}
            }
        }

        Self::write_order_state(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(OrderTransition { order, reservation })
    }

    async fn settle_payment(
        &self,
        id: OrderId,
        outcome: PaymentOutcome,
        at: DateTime<Utc>,
    ) -> Result<OrderTransition> {
        let mut tx = self.begin().await?;
        let mut order = Self::load_order(&mut tx, id, true)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))?;
        let mut reservation = Self::latest_reservation(&mut tx, id, true).await?;

        match outcome {
            PaymentOutcome::Completed { reference } => {
                order.mark_paid(reference, at)?;
                let held = reservation
                    .as_mut()
                    .ok_or_else(|| StoreError::not_found("reservation for order", id))?;
                held.confirm(at)?;
                Self::apply_lines(
                    &mut tx,
                    held.lines(),
                    &CONFIRM,
                    MovementKind::Confirmation,
                    &MovementReference::reservation(id, held.id),
                    StockLevel::confirm,
                )
                .await?;
                Self::write_reservation_status(&mut tx, held).await?;
            }
            PaymentOutcome::Failed => {
                order.mark_payment_failed(at)?;
                if let Some(held) = reservation.as_mut()
                    && held.status().can_cancel()
                {
                    held.cancel(at)?;
                    Self::apply_lines(
                        &mut tx,
                        held.lines(),
                        &RELEASE,
                        MovementKind::Release,
                        &MovementReference::reservation(id, held.id).with_reason("payment failed"),
                        StockLevel::release,
                    )
                    .await?;
                    Self::write_reservation_status(&mut tx, held).await?;
                }
            }
        }

        Self::write_order_state(&mut tx, &order).await?;
        tx.commit().await?;
        Ok(OrderTransition { order, reservation })
    }

    async fn update_order_status(&self, order: &Order, expected: OrderStatus) -> Result<()> {
        let mut tx = self.begin().await?;
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, payment_reference = $4,
                tracking_number = $5, updated_at = $6
            WHERE id = $1 AND status = $7
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status().as_str())
        .bind(order.payment_status().as_str())
        .bind(order.payment_reference())
        .bind(order.tracking_number())
        .bind(order.updated_at())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(order.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::conflict("order", order.id),
                None => StoreError::not_found("order", order.id),
            });
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn cart(&self, id: CartId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        Self::load_cart(&mut conn, id).await
    }

    async fn active_cart(&self, tenant_id: TenantId, user_id: UserId) -> Result<Option<Cart>> {
        let mut conn = self.pool.acquire().await?;
        let id: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM carts WHERE tenant_id = $1 AND user_id = $2")
                .bind(tenant_id.as_uuid())
                .bind(user_id.as_uuid())
                .fetch_optional(&mut *conn)
                .await?;
        match id {
            Some(id) => Self::load_cart(&mut conn, CartId::from_uuid(id)).await,
            None => Ok(None),
        }
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO carts (id, tenant_id, user_id, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.tenant_id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "one_active_cart") {
                return StoreError::conflict("cart", cart.id);
            }
            StoreError::from(e)
        })?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for (position, item) in cart.items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO cart_items (cart_id, position, product_id, variant_id, quantity,
                    price_snapshot, added_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(cart.id.as_uuid())
            .bind(position as i32)
            .bind(item.product_id.as_uuid())
            .bind(item.variant_id.map(Uuid::from))
            .bind(i64::from(item.quantity))
            .bind(item.price_snapshot.cents())
            .bind(item.added_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl CouponStore for PostgresStore {
    async fn coupon_by_code(
        &self,
        tenant_id: TenantId,
        code: &CouponCode,
    ) -> Result<Option<Coupon>> {
        let row = sqlx::query("SELECT * FROM coupons WHERE tenant_id = $1 AND code = $2")
            .bind(tenant_id.as_uuid())
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_coupon).transpose()
    }

    async fn save_coupon(&self, coupon: &Coupon) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO coupons (id, tenant_id, code, discount, max_discount, min_purchase,
                max_uses, used_count, expires_at, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                discount = EXCLUDED.discount,
                max_discount = EXCLUDED.max_discount,
                min_purchase = EXCLUDED.min_purchase,
                max_uses = EXCLUDED.max_uses,
                expires_at = EXCLUDED.expires_at,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(coupon.id.as_uuid())
        .bind(coupon.tenant_id.as_uuid())
        .bind(coupon.code.as_str())
        .bind(Json(coupon.discount))
        .bind(coupon.max_discount.map(|m| m.cents()))
        .bind(coupon.min_purchase.map(|m| m.cents()))
        .bind(coupon.max_uses.map(i64::from))
        .bind(i64::from(coupon.used_count))
        .bind(coupon.expires_at)
        .bind(coupon.is_active)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, "unique_tenant_coupon_code") {
                return StoreError::conflict("coupon", &coupon.code);
            }
            StoreError::from(e)
        })?;
        Ok(())
    }

    async fn increment_coupon_usage(&self, id: CouponId) -> Result<Coupon> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(
            r#"
            UPDATE coupons SET used_count = used_count + 1
            WHERE id = $1 AND (max_uses IS NULL OR used_count < max_uses)
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let code: Option<String> = sqlx::query_scalar("SELECT code FROM coupons WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match code {
                Some(code) => CouponError::UsageLimitReached {
                    code: CouponCode::new(code),
                }
                .into(),
                None => StoreError::not_found("coupon", id),
            });
        };

        let coupon = Self::row_to_coupon(&row)?;
        tx.commit().await?;
        Ok(coupon)
    }
}

#[async_trait]
impl FollowUpStore for PostgresStore {
    async fn enqueue_follow_up(&self, task: &FollowUpTask) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO follow_up_tasks (id, kind, attempts, last_error, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(task.id.as_uuid())
        .bind(Json(&task.kind))
        .bind(i64::from(task.attempts))
        .bind(task.last_error.as_deref())
        .bind(task.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pending_follow_ups(&self, limit: usize) -> Result<Vec<FollowUpTask>> {
        let rows = sqlx::query("SELECT * FROM follow_up_tasks ORDER BY created_at ASC LIMIT $1")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::row_to_follow_up).collect()
    }

    async fn complete_follow_up(&self, id: FollowUpId) -> Result<()> {
        sqlx::query("DELETE FROM follow_up_tasks WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_follow_up_failure(&self, id: FollowUpId, error: &str) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE follow_up_tasks SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(error)
        .execute(&self.pool)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::not_found("follow-up task", id));
        }
        Ok(())
    }
}

fn variant_column(key: &StockKey) -> Uuid {
    key.variant_id.map(Uuid::from).unwrap_or(Uuid::nil())
}

fn key_from_columns(product_id: Uuid, variant_id: Uuid) -> StockKey {
    let variant_id = (!variant_id.is_nil()).then(|| VariantId::from_uuid(variant_id));
    StockKey::new(ProductId::from_uuid(product_id), variant_id)
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

fn u32_col(row: &PgRow, column: &str) -> Result<u32> {
    to_u32(row.try_get(column)?, column)
}

fn money_col(row: &PgRow, column: &str) -> Result<Money> {
    Ok(Money::from_cents(row.try_get(column)?))
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}
