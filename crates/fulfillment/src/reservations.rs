//! Reservation manager: creates, confirms and cancels stock reservations
//! tied to an order.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use common::{OrderId, ReservationId};
use domain::{MovementReference, Reservation, ReservationLine};
use store::{ReservationStore, StockStore};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::error::{FulfillmentError, Result, bounded};
use crate::ledger::StockLedger;
use crate::services::{AuditEvent, AuditSink};

/// Owns the Reserved -> Confirmed / Cancelled lifecycle.
#[derive(Clone)]
pub struct ReservationManager<S> {
    store: S,
    ledger: StockLedger<S>,
    audit: Arc<dyn AuditSink>,
    call_timeout: Duration,
}

impl<S> ReservationManager<S>
where
    S: StockStore + ReservationStore + Clone,
{
    pub fn new(store: S, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            ledger: StockLedger::new(store.clone(), audit.clone()),
            store,
            audit,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.ledger = self.ledger.with_call_timeout(timeout);
        self.call_timeout = timeout;
        self
    }

    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    /// Reserves every line for `order_id`, all or nothing.
    ///
    /// Lines for the same stock key are merged. If any line cannot be
    /// reserved, the lines already claimed by this call are released before
    /// the error is returned.
    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    pub async fn create(
        &self,
        order_id: OrderId,
        lines: Vec<ReservationLine>,
    ) -> Result<Reservation> {
        let reservation = Reservation::new(order_id, lines)?;
        let reference = MovementReference::reservation(order_id, reservation.id);

        let mut claimed: Vec<ReservationLine> = Vec::with_capacity(reservation.lines().len());
        for line in reservation.lines() {
            match self
                .ledger
                .reserve(line.key, line.quantity, reference.clone())
                .await
            {
                Ok(_) => claimed.push(*line),
                Err(e) => {
                    tracing::info!(%order_id, key = %line.key, error = %e, "reservation failed, rolling back");
                    self.compensate(&claimed, &reference).await;
                    return Err(e);
                }
            }
        }

        if let Err(e) = bounded(
            "insert_reservation",
            self.call_timeout,
            self.store.insert_reservation(&reservation),
        )
        .await
        {
            tracing::warn!(%order_id, error = %e, "failed to persist reservation, rolling back");
            self.compensate(&claimed, &reference).await;
            return Err(e);
        }

        tracing::info!(
            %order_id,
            reservation_id = %reservation.id,
            units = reservation.total_quantity(),
            "stock reserved"
        );
        self.audit
            .record(
                AuditEvent::ReservationCreated {
                    reservation_id: reservation.id,
                    order_id,
                    units: reservation.total_quantity(),
                },
                reservation.created_at,
            )
            .await;
        Ok(reservation)
    }

    /// Releases claimed lines in reverse order. Failures are logged and
    /// counted; the caller still gets the original error.
    async fn compensate(&self, claimed: &[ReservationLine], reference: &MovementReference) {
        let reference = reference.clone().with_reason("reservation rolled back");
        for line in claimed.iter().rev() {
            if let Err(e) = self
                .ledger
                .release(line.key, line.quantity, reference.clone())
                .await
            {
                metrics::counter!("reservation_compensation_failures_total").increment(1);
                tracing::error!(
                    key = %line.key,
                    quantity = line.quantity,
                    error = %e,
                    "failed to release stock during rollback"
                );
            }
        }
    }

    /// Confirms every line and marks the reservation Confirmed.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = bounded(
            "confirm_reservation",
            self.call_timeout,
            self.store.confirm_reservation(id, Utc::now()),
        )
        .await?;

        tracing::info!(reservation_id = %id, order_id = %reservation.order_id, "reservation confirmed");
        self.audit
            .record(
                AuditEvent::ReservationConfirmed {
                    reservation_id: id,
                    order_id: reservation.order_id,
                },
                Utc::now(),
            )
            .await;
        Ok(reservation)
    }

    /// Releases every line and marks the reservation Cancelled.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, id: ReservationId) -> Result<Reservation> {
        let reservation = bounded(
            "cancel_reservation",
            self.call_timeout,
            self.store.cancel_reservation(id, Utc::now()),
        )
        .await?;

        tracing::info!(reservation_id = %id, order_id = %reservation.order_id, "reservation cancelled");
        self.audit
            .record(
                AuditEvent::ReservationCancelled {
                    reservation_id: id,
                    order_id: reservation.order_id,
                },
                Utc::now(),
            )
            .await;
        Ok(reservation)
    }

    pub async fn get(&self, id: ReservationId) -> Result<Reservation> {
        bounded("reservation", self.call_timeout, self.store.reservation(id))
            .await?
            .ok_or_else(|| FulfillmentError::not_found("reservation", id))
    }

    /// The latest reservation made for an order, if any.
    pub async fn for_order(&self, order_id: OrderId) -> Result<Option<Reservation>> {
        bounded(
            "reservation_for_order",
            self.call_timeout,
            self.store.reservation_for_order(order_id),
        )
        .await
    }
}
