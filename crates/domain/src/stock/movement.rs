use chrono::{DateTime, Utc};
use common::{MovementId, OrderId, ReservationId};
use serde::{Deserialize, Serialize};

use super::{StockKey, StockLevel};
use crate::error::ParseStatusError;

/// What caused a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementKind {
    /// Units claimed by a new reservation.
    Reservation,
    /// A claim returned to the available pool.
    Release,
    /// A claim turned into a sale.
    Confirmation,
    /// Sold units put back on hand after a cancelled order.
    Restock,
    /// Admin correction.
    ManualAdjustment,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Reservation => "Reservation",
            MovementKind::Release => "Release",
            MovementKind::Confirmation => "Confirmation",
            MovementKind::Restock => "Restock",
            MovementKind::ManualAdjustment => "ManualAdjustment",
        }
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MovementKind {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reservation" => Ok(MovementKind::Reservation),
            "Release" => Ok(MovementKind::Release),
            "Confirmation" => Ok(MovementKind::Confirmation),
            "Restock" => Ok(MovementKind::Restock),
            "ManualAdjustment" => Ok(MovementKind::ManualAdjustment),
            other => Err(ParseStatusError::new("movement", other)),
        }
    }
}

/// Links a movement back to whatever triggered it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementReference {
    pub order_id: Option<OrderId>,
    pub reservation_id: Option<ReservationId>,
    pub reason: Option<String>,
}

impl MovementReference {
    pub fn reservation(order_id: OrderId, reservation_id: ReservationId) -> Self {
        Self {
            order_id: Some(order_id),
            reservation_id: Some(reservation_id),
            reason: None,
        }
    }

    pub fn order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Default::default()
        }
    }

    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Append-only audit entry for one stock-affecting change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub key: StockKey,
    pub kind: MovementKind,
    pub quantity_delta: i64,
    pub reserved_delta: i64,
    pub quantity_after: u32,
    pub reserved_after: u32,
    pub reference: MovementReference,
    pub recorded_at: DateTime<Utc>,
}

impl StockMovement {
    /// Records the difference between two states of the same stock level.
    pub fn between(
        kind: MovementKind,
        before: &StockLevel,
        after: &StockLevel,
        reference: MovementReference,
    ) -> Self {
        Self {
            id: MovementId::new(),
            key: after.key,
            kind,
            quantity_delta: i64::from(after.quantity()) - i64::from(before.quantity()),
            reserved_delta: i64::from(after.reserved()) - i64::from(before.reserved()),
            quantity_after: after.quantity(),
            reserved_after: after.reserved(),
            reference,
            recorded_at: Utc::now(),
        }
    }
}
