//! Stock ledger service: guarded access to per-key stock levels and the
//! movement log.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::{MovementReference, StockKey, StockLevel, StockMovement};
use store::StockStore;

use crate::DEFAULT_CALL_TIMEOUT;
use crate::error::{FulfillmentError, Result, bounded};
use crate::services::{AuditEvent, AuditSink};

/// Reserve, release, confirm and adjust stock, one key at a time.
///
/// Each call maps to a single conditional write in the store, so the
/// service itself holds no locks.
#[derive(Clone)]
pub struct StockLedger<S> {
    store: S,
    audit: Arc<dyn AuditSink>,
    call_timeout: Duration,
}

impl<S: StockStore> StockLedger<S> {
    pub fn new(store: S, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Current quantity, reserved and available for a key.
    #[tracing::instrument(skip(self))]
    pub async fn get_available(&self, key: StockKey) -> Result<StockLevel> {
        bounded("stock_level", self.call_timeout, self.store.stock_level(key))
            .await?
            .ok_or_else(|| FulfillmentError::not_found("stock", key))
    }

    /// Sets on-hand quantity, creating the record if needed.
    #[tracing::instrument(skip(self))]
    pub async fn set_stock(&self, key: StockKey, quantity: u32) -> Result<StockLevel> {
        let level = bounded("put_stock", self.call_timeout, self.store.put_stock(key, quantity))
            .await?;
        tracing::info!(%key, quantity, "stock level set");
        Ok(level)
    }

    /// Claims `quantity` units, failing with `InsufficientStock` if fewer are
    /// available.
    #[tracing::instrument(skip(self, reference))]
    pub async fn reserve(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        positive(quantity)?;
        let result = bounded(
            "reserve_stock",
            self.call_timeout,
            self.store.reserve_stock(key, quantity, reference),
        )
        .await;

        match &result {
            Ok(_) => {
                metrics::counter!("stock_reservations_total", "outcome" => "reserved").increment(1)
            }
            Err(FulfillmentError::InsufficientStock { available, .. }) => {
                metrics::counter!("stock_reservations_total", "outcome" => "insufficient")
                    .increment(1);
                tracing::info!(%key, requested = quantity, available, "reservation rejected");
            }
            Err(FulfillmentError::Conflict(_)) => {
                metrics::counter!("stock_reservation_conflicts_total").increment(1);
                metrics::counter!("stock_reservations_total", "outcome" => "conflict").increment(1);
            }
            Err(_) => {
                metrics::counter!("stock_reservations_total", "outcome" => "error").increment(1)
            }
        }
        result
    }

    /// Returns claimed units to the available pool.
    #[tracing::instrument(skip(self, reference))]
    pub async fn release(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        positive(quantity)?;
        bounded(
            "release_stock",
            self.call_timeout,
            self.store.release_stock(key, quantity, reference),
        )
        .await
    }

    /// Turns claimed units into a sale.
    #[tracing::instrument(skip(self, reference))]
    pub async fn confirm(
        &self,
        key: StockKey,
        quantity: u32,
        reference: MovementReference,
    ) -> Result<StockLevel> {
        positive(quantity)?;
        bounded(
            "confirm_stock",
            self.call_timeout,
            self.store.confirm_stock(key, quantity, reference),
        )
        .await
    }

    /// Admin correction of on-hand stock. The reason is kept in the movement
    /// log.
    #[tracing::instrument(skip(self))]
    pub async fn adjust(&self, key: StockKey, delta: i64, reason: &str) -> Result<StockLevel> {
        if delta == 0 {
            return Err(FulfillmentError::Validation(
                "adjustment delta must not be zero".to_string(),
            ));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(FulfillmentError::Validation(
                "adjustment reason is required".to_string(),
            ));
        }

        let level = bounded(
            "adjust_stock",
            self.call_timeout,
            self.store
                .adjust_stock(key, delta, MovementReference::reason(reason)),
        )
        .await?;

        tracing::info!(%key, delta, quantity = level.quantity(), reason, "stock adjusted");
        self.audit
            .record(
                AuditEvent::StockAdjusted {
                    key,
                    delta,
                    reason: reason.to_string(),
                },
                Utc::now(),
            )
            .await;
        Ok(level)
    }

    /// Movement log for a key, oldest first.
    pub async fn movements(&self, key: StockKey) -> Result<Vec<StockMovement>> {
        bounded("movements", self.call_timeout, self.store.movements(key)).await
    }
}

fn positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(FulfillmentError::Validation(
            "quantity must be greater than 0".to_string(),
        ));
    }
    Ok(())
}
