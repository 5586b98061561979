//! Reservation state machine.

use serde::{Deserialize, Serialize};

use super::ReservationError;
use crate::error::ParseStatusError;

/// The state of a reservation in its lifecycle.
///
/// State transitions:
/// ```text
/// Reserved ──┬──► Confirmed
///            └──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReservationStatus {
    /// Stock is claimed, awaiting payment.
    #[default]
    Reserved,

    /// Payment confirmed, stock deducted (terminal state).
    Confirmed,

    /// Claim released (terminal state).
    Cancelled,
}

impl ReservationStatus {
    pub fn can_confirm(&self) -> bool {
        matches!(self, ReservationStatus::Reserved)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, ReservationStatus::Reserved)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Confirmed | ReservationStatus::Cancelled
        )
    }

    /// Validates a transition, returning the new status.
    pub fn transition(self, to: ReservationStatus) -> Result<ReservationStatus, ReservationError> {
        let allowed = match to {
            ReservationStatus::Confirmed => self.can_confirm(),
            ReservationStatus::Cancelled => self.can_cancel(),
            ReservationStatus::Reserved => false,
        };
        if allowed {
            Ok(to)
        } else {
            Err(ReservationError::InvalidStateTransition { from: self, to })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "Reserved",
            ReservationStatus::Confirmed => "Confirmed",
            ReservationStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Reserved" => Ok(ReservationStatus::Reserved),
            "Confirmed" => Ok(ReservationStatus::Confirmed),
            "Cancelled" => Ok(ReservationStatus::Cancelled),
            other => Err(ParseStatusError::new("reservation", other)),
        }
    }
}
