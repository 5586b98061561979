//! Inventory reservations tied to an order.

mod state;

pub use state::ReservationStatus;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{OrderId, ReservationId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stock::StockKey;

/// Errors that can occur during reservation operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    #[error("Invalid reservation state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    #[error("Reservation has no lines")]
    NoLines,

    #[error("Invalid reservation quantity for {key}: must be greater than 0")]
    InvalidQuantity { key: StockKey },
}

/// One stock key claimed by a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationLine {
    pub key: StockKey,
    pub quantity: u32,
}

impl ReservationLine {
    pub fn new(key: StockKey, quantity: u32) -> Self {
        Self { key, quantity }
    }
}

/// A claim against stock for one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    status: ReservationStatus,
    lines: Vec<ReservationLine>,
    pub created_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Creates a reservation in the Reserved state.
    ///
    /// Lines for the same stock key are merged, and are kept sorted by key
    /// so that concurrent reservations touch rows in a consistent order.
    pub fn new(order_id: OrderId, lines: Vec<ReservationLine>) -> Result<Self, ReservationError> {
        let mut merged: BTreeMap<StockKey, u32> = BTreeMap::new();
        for line in lines {
            if line.quantity == 0 {
                return Err(ReservationError::InvalidQuantity { key: line.key });
            }
            let total = merged.entry(line.key).or_default();
            *total = total.saturating_add(line.quantity);
        }
        if merged.is_empty() {
            return Err(ReservationError::NoLines);
        }

        Ok(Self {
            id: ReservationId::new(),
            order_id,
            status: ReservationStatus::Reserved,
            lines: merged
                .into_iter()
                .map(|(key, quantity)| ReservationLine { key, quantity })
                .collect(),
            created_at: Utc::now(),
            confirmed_at: None,
            cancelled_at: None,
        })
    }

    /// Rebuilds a reservation from persisted values.
    pub fn restore(
        id: ReservationId,
        order_id: OrderId,
        status: ReservationStatus,
        lines: Vec<ReservationLine>,
        created_at: DateTime<Utc>,
        confirmed_at: Option<DateTime<Utc>>,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            order_id,
            status,
            lines,
            created_at,
            confirmed_at,
            cancelled_at,
        }
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn lines(&self) -> &[ReservationLine] {
        &self.lines
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }

    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    pub fn confirm(&mut self, at: DateTime<Utc>) -> Result<(), ReservationError> {
        self.status = self.status.transition(ReservationStatus::Confirmed)?;
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), ReservationError> {
        self.status = self.status.transition(ReservationStatus::Cancelled)?;
        self.cancelled_at = Some(at);
        Ok(())
    }
}
