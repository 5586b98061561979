//! Replays post-commit work that failed the first time.

use domain::{CouponError, OrderStatus};
use serde::Serialize;
use store::{CommerceStore, FollowUpKind, FollowUpTask};

use crate::error::{FulfillmentError, Result, bounded};
use crate::orders::OrderFulfillment;

/// What one retry pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FollowUpReport {
    /// Replayed successfully.
    pub completed: usize,
    /// Failed again and left in the queue.
    pub failed: usize,
    /// No longer applicable and removed without replaying.
    pub dropped: usize,
}

enum Replay {
    Done,
    Dropped,
}

impl<S> OrderFulfillment<S>
where
    S: CommerceStore + Clone,
{
    /// Retries up to `limit` queued tasks, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn retry_follow_ups(&self, limit: usize) -> Result<FollowUpReport> {
        let tasks = bounded(
            "pending_follow_ups",
            self.call_timeout,
            self.store.pending_follow_ups(limit),
        )
        .await?;

        let mut report = FollowUpReport::default();
        for task in tasks {
            let kind = task.kind.name();
            match self.replay(&task).await {
                Ok(outcome) => {
                    bounded(
                        "complete_follow_up",
                        self.call_timeout,
                        self.store.complete_follow_up(task.id),
                    )
                    .await?;
                    match outcome {
                        Replay::Done => {
                            report.completed += 1;
                            metrics::counter!("follow_up_tasks_completed_total", "kind" => kind)
                                .increment(1);
                        }
                        Replay::Dropped => {
                            report.dropped += 1;
                            metrics::counter!("follow_up_tasks_dropped_total", "kind" => kind)
                                .increment(1);
                        }
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    metrics::counter!("follow_up_tasks_failed_total", "kind" => kind).increment(1);
                    tracing::warn!(
                        task_id = %task.id,
                        kind,
                        attempts = task.attempts + 1,
                        error = %e,
                        "follow-up task failed again"
                    );
                    bounded(
                        "record_follow_up_failure",
                        self.call_timeout,
                        self.store.record_follow_up_failure(task.id, &e.to_string()),
                    )
                    .await?;
                }
            }
        }

        if report != FollowUpReport::default() {
            tracing::info!(
                completed = report.completed,
                failed = report.failed,
                dropped = report.dropped,
                "follow-up pass finished"
            );
        }
        Ok(report)
    }

    /// `Err` means the task should stay queued.
    async fn replay(&self, task: &FollowUpTask) -> Result<Replay> {
        match &task.kind {
            FollowUpKind::IncrementCouponUsage {
                coupon_id,
                order_id,
            } => match self.coupons.increment_usage(*coupon_id).await {
                Ok(_) => Ok(Replay::Done),
                Err(FulfillmentError::Coupon(CouponError::UsageLimitReached { code })) => {
                    metrics::counter!("coupon_usage_overruns_total").increment(1);
                    tracing::error!(%order_id, %code, "coupon usage limit reached after order commit");
                    Ok(Replay::Dropped)
                }
                Err(FulfillmentError::NotFound { .. }) => Ok(Replay::Dropped),
                Err(e) => Err(e),
            },
            FollowUpKind::CreateReservation { order_id } => {
                let order = bounded("order", self.call_timeout, self.store.order(*order_id))
                    .await?;
                let Some(order) = order.filter(|o| o.status() == OrderStatus::Pending) else {
                    return Ok(Replay::Dropped);
                };
                if self.reservations.for_order(order.id).await?.is_some() {
                    return Ok(Replay::Done);
                }

                match self
                    .reservations
                    .create(order.id, order.reservation_lines())
                    .await
                {
                    Ok(_) => Ok(Replay::Done),
                    Err(e) if e.is_retryable() || matches!(e, FulfillmentError::Store(_)) => Err(e),
                    Err(e) => {
                        tracing::warn!(order_id = %order.id, error = %e, "reservation rejected on retry, cancelling order");
                        self.cancel_unreserved(&order).await?;
                        Ok(Replay::Dropped)
                    }
                }
            }
        }
    }
}
