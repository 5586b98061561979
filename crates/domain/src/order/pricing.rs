//! Shipping, tax and total calculation.

use common::{BasisPoints, Money};
use serde::{Deserialize, Serialize};

/// Tenant pricing rules applied at order creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Subtotals strictly above this ship free.
    pub free_shipping_threshold: Money,
    pub flat_shipping: Money,
    pub tax_rate: BasisPoints,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_major(1000),
            flat_shipping: Money::from_major(99),
            tax_rate: BasisPoints::percent(16),
        }
    }
}

impl PricingPolicy {
    pub fn shipping(&self, subtotal: Money) -> Money {
        if subtotal > self.free_shipping_threshold {
            Money::zero()
        } else {
            self.flat_shipping
        }
    }

    pub fn tax(&self, subtotal: Money) -> Money {
        subtotal.apply_rate(self.tax_rate)
    }

    /// Totals for a subtotal before any discount.
    pub fn quote(&self, subtotal: Money) -> OrderTotals {
        OrderTotals::new(subtotal, self.shipping(subtotal), self.tax(subtotal), Money::zero())
    }
}

/// Monetary breakdown of an order. `total` is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

impl OrderTotals {
    pub fn new(subtotal: Money, shipping: Money, tax: Money, discount: Money) -> Self {
        Self {
            subtotal,
            shipping,
            tax,
            discount,
            total: (subtotal + shipping + tax - discount).non_negative(),
        }
    }

    /// The amount a coupon is measured against.
    pub fn before_discount(&self) -> Money {
        self.subtotal + self.shipping + self.tax
    }

    pub fn with_discount(self, discount: Money) -> Self {
        Self::new(self.subtotal, self.shipping, self.tax, discount)
    }
}
