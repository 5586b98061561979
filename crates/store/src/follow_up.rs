//! Post-commit work that failed and is waiting to be retried.

use chrono::{DateTime, Utc};
use common::{CouponId, FollowUpId, OrderId};
use serde::{Deserialize, Serialize};

/// What has to be replayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FollowUpKind {
    /// Count one use of a coupon against a committed order.
    IncrementCouponUsage { coupon_id: CouponId, order_id: OrderId },

    /// Reserve stock for a committed order.
    CreateReservation { order_id: OrderId },
}

impl FollowUpKind {
    pub fn name(&self) -> &'static str {
        match self {
            FollowUpKind::IncrementCouponUsage { .. } => "increment_coupon_usage",
            FollowUpKind::CreateReservation { .. } => "create_reservation",
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            FollowUpKind::IncrementCouponUsage { order_id, .. }
            | FollowUpKind::CreateReservation { order_id } => *order_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpTask {
    pub id: FollowUpId,
    pub kind: FollowUpKind,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FollowUpTask {
    /// A task recording the failure that caused it.
    pub fn new(kind: FollowUpKind, error: impl Into<String>) -> Self {
        Self {
            id: FollowUpId::new(),
            kind,
            attempts: 1,
            last_error: Some(error.into()),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_with_type_tag() {
        let order_id = OrderId::new();
        let kind = FollowUpKind::CreateReservation { order_id };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "CreateReservation");
        assert_eq!(kind.order_id(), order_id);

        let back: FollowUpKind = serde_json::from_value(json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn new_task_counts_first_attempt() {
        let task = FollowUpTask::new(
            FollowUpKind::IncrementCouponUsage {
                coupon_id: CouponId::new(),
                order_id: OrderId::new(),
            },
            "timeout",
        );
        assert_eq!(task.attempts, 1);
        assert_eq!(task.last_error.as_deref(), Some("timeout"));
        assert_eq!(task.kind.name(), "increment_coupon_usage");
    }
}
