//! Coupon rules and discount calculation.

use chrono::{DateTime, Utc};
use common::{BasisPoints, CouponId, Money, TenantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a coupon cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Coupon not found: {code}")]
    NotFound { code: CouponCode },

    #[error("Coupon {code} has expired")]
    Expired { code: CouponCode },

    #[error("Coupon {code} has reached its usage limit")]
    UsageLimitReached { code: CouponCode },

    #[error("Coupon requires a minimum purchase of {required}")]
    BelowMinimumPurchase { required: Money },
}

/// A coupon code, compared case-insensitively and stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CouponCode(String);

impl CouponCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CouponCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CouponCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// How a coupon reduces the order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CouponDiscount {
    Percentage(BasisPoints),
    FixedAmount(Money),
}

impl CouponDiscount {
    pub fn type_name(&self) -> &'static str {
        match self {
            CouponDiscount::Percentage(_) => "Percentage",
            CouponDiscount::FixedAmount(_) => "FixedAmount",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub tenant_id: TenantId,
    pub code: CouponCode,
    pub discount: CouponDiscount,
    pub max_discount: Option<Money>,
    pub min_purchase: Option<Money>,
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Coupon {
    /// An active, unlimited coupon with no minimum purchase.
    pub fn new(tenant_id: TenantId, code: impl AsRef<str>, discount: CouponDiscount) -> Self {
        Self {
            id: CouponId::new(),
            tenant_id,
            code: CouponCode::new(code),
            discount,
            max_discount: None,
            min_purchase: None,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            is_active: true,
        }
    }

    pub fn with_max_discount(mut self, max: Money) -> Self {
        self.max_discount = Some(max);
        self
    }

    pub fn with_min_purchase(mut self, min: Money) -> Self {
        self.min_purchase = Some(min);
        self
    }

    pub fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn usage_exhausted(&self) -> bool {
        self.max_uses.is_some_and(|max| self.used_count >= max)
    }

    /// Checks tenant, activity, expiry, usage and minimum purchase, in that
    /// order.
    pub fn validate(
        &self,
        tenant_id: TenantId,
        order_total: Money,
        now: DateTime<Utc>,
    ) -> Result<(), CouponError> {
        if self.tenant_id != tenant_id || !self.is_active {
            return Err(CouponError::NotFound {
                code: self.code.clone(),
            });
        }
        if self.expires_at.is_some_and(|at| now > at) {
            return Err(CouponError::Expired {
                code: self.code.clone(),
            });
        }
        if self.usage_exhausted() {
            return Err(CouponError::UsageLimitReached {
                code: self.code.clone(),
            });
        }
        match self.min_purchase {
            Some(required) if order_total < required => {
                Err(CouponError::BelowMinimumPurchase { required })
            }
            _ => Ok(()),
        }
    }

    /// Discount for `order_total`, never negative and never above the total.
    pub fn discount_for(&self, order_total: Money) -> Money {
        let total = order_total.non_negative();
        let raw = match self.discount {
            CouponDiscount::Percentage(rate) => {
                let amount = total.apply_rate(rate);
                match self.max_discount {
                    Some(max) => amount.min(max),
                    None => amount,
                }
            }
            CouponDiscount::FixedAmount(amount) => amount.min(total),
        };
        raw.non_negative().min(total)
    }
}
