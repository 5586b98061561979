//! Coupon engine: lookup, validation, discount and usage accounting.

use std::time::Duration;

use chrono::Utc;
use common::{CouponId, Money, TenantId};
use domain::{Coupon, CouponCode, CouponError};
use store::CouponStore;

use crate::DEFAULT_CALL_TIMEOUT;
use crate::error::{FulfillmentError, Result, bounded};

#[derive(Clone)]
pub struct CouponEngine<S> {
    store: S,
    call_timeout: Duration,
}

impl<S: CouponStore> CouponEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Looks up `code` (case-insensitive) within the tenant and checks it can
    /// be applied to `order_total`.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        tenant_id: TenantId,
        code: &str,
        order_total: Money,
    ) -> Result<Coupon> {
        let code = CouponCode::new(code);
        let result = async {
            let coupon = bounded(
                "coupon_by_code",
                self.call_timeout,
                self.store.coupon_by_code(tenant_id, &code),
            )
            .await?
            .ok_or_else(|| CouponError::NotFound { code: code.clone() })?;
            coupon.validate(tenant_id, order_total, Utc::now())?;
            Ok::<_, FulfillmentError>(coupon)
        }
        .await;

        if let Err(e) = &result {
            metrics::counter!("coupon_validation_failures_total").increment(1);
            tracing::debug!(%code, error = %e, "coupon rejected");
        }
        result
    }

    /// Discount `coupon` grants on `order_total`, in `[0, order_total]`.
    pub fn calculate_discount(&self, coupon: &Coupon, order_total: Money) -> Money {
        coupon.discount_for(order_total)
    }

    /// Counts one use against a committed order.
    #[tracing::instrument(skip(self))]
    pub async fn increment_usage(&self, coupon_id: CouponId) -> Result<Coupon> {
        bounded(
            "increment_coupon_usage",
            self.call_timeout,
            self.store.increment_coupon_usage(coupon_id),
        )
        .await
    }

    /// Creates or replaces a coupon definition.
    pub async fn save(&self, coupon: &Coupon) -> Result<()> {
        bounded("save_coupon", self.call_timeout, self.store.save_coupon(coupon)).await
    }
}
