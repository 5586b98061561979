//! Pre-checkout consistency report for a cart.

use common::{BasisPoints, Money, ProductId, TenantId, VariantId};
use serde::{Deserialize, Serialize};

use super::CartItem;
use crate::catalog::{ProductSnapshot, VariantSnapshot};
use crate::stock::StockLevel;

/// Relative price change above which checkout warns the shopper.
pub const PRICE_DRIFT_THRESHOLD: BasisPoints = BasisPoints::percent(10);

/// Why a cart line was flagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IssueKind {
    ProductUnavailable,
    VariantUnavailable,
    InsufficientStock { available: u32, requested: u32 },
    PriceDrift { previous: Money, current: Money },
}

/// One flagged cart line with a shopper-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutIssue {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub kind: IssueKind,
    pub message: String,
}

/// What the catalog and ledger currently say about one cart line.
#[derive(Debug, Clone, Default)]
pub struct LineFacts {
    pub product: Option<ProductSnapshot>,
    pub variant: Option<VariantSnapshot>,
    pub stock: Option<StockLevel>,
}

/// Result of re-checking a cart right before order creation.
///
/// Errors block checkout; warnings never do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartValidation {
    pub errors: Vec<CheckoutIssue>,
    pub warnings: Vec<CheckoutIssue>,
}

impl CartValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Checks one line against current catalog and stock facts.
    pub fn check_line(&mut self, tenant_id: TenantId, item: &CartItem, facts: &LineFacts) {
        let product = match &facts.product {
            Some(p) if p.tenant_id == tenant_id => p,
            _ => {
                self.error(
                    item,
                    IssueKind::ProductUnavailable,
                    format!("Product {} no longer exists", item.product_id),
                );
                return;
            }
        };

        if !product.published {
            self.error(
                item,
                IssueKind::ProductUnavailable,
                format!("{} is no longer available", product.name),
            );
            return;
        }

        let current_price = match item.variant_id {
            Some(variant_id) => match &facts.variant {
                Some(v) if v.id == variant_id && v.product_id == product.id => {
                    v.current_price(product)
                }
                _ => {
                    self.error(
                        item,
                        IssueKind::VariantUnavailable,
                        format!("The selected option of {} no longer exists", product.name),
                    );
                    return;
                }
            },
            None => product.current_price(),
        };

        let available = facts.stock.map(|s| s.available()).unwrap_or(0);
        if available < item.quantity {
            self.error(
                item,
                IssueKind::InsufficientStock {
                    available,
                    requested: item.quantity,
                },
                format!(
                    "Only {available} of {} available (requested {})",
                    product.name, item.quantity
                ),
            );
        }

        if price_drift_exceeds(item.price_snapshot, current_price, PRICE_DRIFT_THRESHOLD) {
            self.warnings.push(CheckoutIssue {
                product_id: item.product_id,
                variant_id: item.variant_id,
                kind: IssueKind::PriceDrift {
                    previous: item.price_snapshot,
                    current: current_price,
                },
                message: format!(
                    "The price of {} changed from {} to {}",
                    product.name, item.price_snapshot, current_price
                ),
            });
        }
    }

    fn error(&mut self, item: &CartItem, kind: IssueKind, message: String) {
        self.errors.push(CheckoutIssue {
            product_id: item.product_id,
            variant_id: item.variant_id,
            kind,
            message,
        });
    }
}

/// `|current - snapshot| / snapshot > threshold`, in exact integer arithmetic.
pub fn price_drift_exceeds(snapshot: Money, current: Money, threshold: BasisPoints) -> bool {
    if snapshot.is_zero() {
        return !current.is_zero();
    }
    let diff = i128::from((current - snapshot).abs().cents());
    let base = i128::from(snapshot.abs().cents());
    diff * 10_000 > base * i128::from(threshold.as_u32())
}
