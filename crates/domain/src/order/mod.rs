//! Orders and related types.

mod number;
mod pricing;
mod state;

pub use number::{OrderNumber, ParseOrderNumberError};
pub use pricing::{OrderTotals, PricingPolicy};
pub use state::{OrderStatus, PaymentStatus};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, TenantId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cart::CartItem;
use crate::catalog::Address;
use crate::coupon::CouponCode;
use crate::reservation::ReservationLine;
use crate::stock::StockKey;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: OrderStatus,
        action: &'static str,
    },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    #[error("Payment already settled as {status}")]
    PaymentAlreadySettled { status: PaymentStatus },
}

/// An immutable order line. `price_at_purchase` comes from the cart's price
/// snapshot, never from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub price_at_purchase: Money,
}

impl OrderLine {
    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }

    pub fn line_total(&self) -> Money {
        self.price_at_purchase.multiply(self.quantity)
    }
}

impl From<&CartItem> for OrderLine {
    fn from(item: &CartItem) -> Self {
        Self {
            product_id: item.product_id,
            variant_id: item.variant_id,
            quantity: item.quantity,
            price_at_purchase: item.price_snapshot,
        }
    }
}

/// Everything needed to place an order except its number.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub coupon_code: Option<CouponCode>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub order_number: OrderNumber,
    status: OrderStatus,
    payment_status: PaymentStatus,
    pub payment_method: String,
    payment_reference: Option<String>,
    tracking_number: Option<String>,
    lines: Vec<OrderLine>,
    pub totals: OrderTotals,
    pub coupon_code: Option<CouponCode>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderError {
    /// Rejects a reservation for an order that has left Pending, typically
    /// because it was cancelled while the reservation was being made.
    pub fn check_reservable(status: OrderStatus) -> Result<(), OrderError> {
        if status.can_reserve_stock() {
            return Ok(());
        }
        Err(OrderError::InvalidStateTransition {
            current_state: status,
            action: "reserve stock",
        })
    }
}

impl Order {
    /// Places a Pending order with Pending payment.
    pub fn place(draft: OrderDraft, order_number: OrderNumber) -> Result<Self, OrderError> {
        if draft.lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            tenant_id: draft.tenant_id,
            user_id: draft.user_id,
            order_number,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: draft.payment_method,
            payment_reference: None,
            tracking_number: None,
            lines: draft.lines,
            totals: draft.totals,
            coupon_code: draft.coupon_code,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The order's lines as cart items at their purchase prices, for
    /// returning them to the shopper's cart.
    pub fn cart_items(&self) -> Vec<CartItem> {
        self.lines
            .iter()
            .map(|l| CartItem::new(l.product_id, l.variant_id, l.quantity, l.price_at_purchase))
            .collect()
    }

    pub fn reservation_lines(&self) -> Vec<ReservationLine> {
        self.lines
            .iter()
            .map(|l| ReservationLine::new(l.key(), l.quantity))
            .collect()
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.require(self.status.can_cancel(), "cancel")?;
        self.status = OrderStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }

    /// Records a successful payment and starts processing.
    pub fn mark_paid(&mut self, reference: String, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.require_unsettled()?;
        self.require(self.status.can_start_processing(), "confirm payment")?;
        self.payment_status = PaymentStatus::Completed;
        self.payment_reference = Some(reference);
        self.status = OrderStatus::Processing;
        self.updated_at = at;
        Ok(())
    }

    /// Records a failed payment and cancels the order.
    pub fn mark_payment_failed(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.require_unsettled()?;
        self.require(self.status.can_start_processing(), "fail payment")?;
        self.payment_status = PaymentStatus::Failed;
        self.status = OrderStatus::Cancelled;
        self.updated_at = at;
        Ok(())
    }

    pub fn ship(&mut self, tracking_number: Option<String>, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.require(self.status.can_ship(), "ship")?;
        self.status = OrderStatus::Shipped;
        self.tracking_number = tracking_number;
        self.updated_at = at;
        Ok(())
    }

    pub fn deliver(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.require(self.status.can_deliver(), "deliver")?;
        self.status = OrderStatus::Delivered;
        self.updated_at = at;
        Ok(())
    }

    fn require(&self, allowed: bool, action: &'static str) -> Result<(), OrderError> {
        if allowed {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition {
                current_state: self.status,
                action,
            })
        }
    }

    fn require_unsettled(&self) -> Result<(), OrderError> {
        if self.payment_status.is_settled() {
            return Err(OrderError::PaymentAlreadySettled {
                status: self.payment_status,
            });
        }
        Ok(())
    }
}

/// Persisted order fields that are not part of `OrderDraft`.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_reference: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Rebuilds an order from persisted values.
    pub fn restore(draft: OrderDraft, record: OrderRecord) -> Self {
        Self {
            id: record.id,
            tenant_id: draft.tenant_id,
            user_id: draft.user_id,
            order_number: record.order_number,
            status: record.status,
            payment_status: record.payment_status,
            payment_method: draft.payment_method,
            payment_reference: record.payment_reference,
            tracking_number: record.tracking_number,
            lines: draft.lines,
            totals: draft.totals,
            coupon_code: draft.coupon_code,
            shipping_address: draft.shipping_address,
            billing_address: draft.billing_address,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::AddressId;

    fn address(user_id: UserId) -> Address {
        Address {
            id: AddressId::new(),
            user_id,
            recipient: "Ada Lovelace".to_string(),
            line1: "12 Analytical St".to_string(),
            line2: None,
            city: "London".to_string(),
            postal_code: "N1".to_string(),
            country: "GB".to_string(),
        }
    }

    fn draft(lines: Vec<OrderLine>) -> OrderDraft {
        let user_id = UserId::new();
        let subtotal = lines.iter().map(OrderLine::line_total).sum();
        OrderDraft {
            tenant_id: TenantId::new(),
            user_id,
            lines,
            totals: PricingPolicy::default().quote(subtotal),
            coupon_code: None,
            shipping_address: address(user_id),
            billing_address: address(user_id),
            payment_method: "card".to_string(),
        }
    }

    fn pending_order() -> Order {
        let line = OrderLine {
            product_id: ProductId::new(),
            variant_id: None,
            quantity: 2,
            price_at_purchase: Money::from_major(50),
        };
        Order::place(draft(vec![line]), OrderNumber::new(2026, 1)).unwrap()
    }

    #[test]
    fn place_requires_lines() {
        assert_eq!(
            Order::place(draft(vec![]), OrderNumber::new(2026, 1)).unwrap_err(),
            OrderError::NoItems
        );
    }

    #[test]
    fn new_order_is_pending() {
        let order = pending_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.totals.subtotal, Money::from_major(100));
        assert_eq!(order.reservation_lines().len(), 1);

        let items = order.cart_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].price_snapshot, Money::from_major(50));
    }

    #[test]
    fn payment_moves_order_to_processing_once() {
        let mut order = pending_order();
        order.mark_paid("pi_123".to_string(), Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Processing);
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
        assert_eq!(order.payment_reference(), Some("pi_123"));

        assert_eq!(
            order.mark_paid("pi_456".to_string(), Utc::now()),
            Err(OrderError::PaymentAlreadySettled {
                status: PaymentStatus::Completed
            })
        );
        assert!(order.mark_payment_failed(Utc::now()).is_err());
    }

    #[test]
    fn failed_payment_cancels() {
        let mut order = pending_order();
        order.mark_payment_failed(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.payment_status(), PaymentStatus::Failed);
    }

    #[test]
    fn cancel_only_before_shipping() {
        let mut order = pending_order();
        order.mark_paid("pi".to_string(), Utc::now()).unwrap();
        order.ship(Some("TRACK1".to_string()), Utc::now()).unwrap();

        let err = order.cancel(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            OrderError::InvalidStateTransition {
                current_state: OrderStatus::Shipped,
                action: "cancel"
            }
        );

        order.deliver(Utc::now()).unwrap();
        assert!(order.status().is_terminal());
        assert_eq!(order.tracking_number(), Some("TRACK1"));
    }

    #[test]
    fn cannot_ship_unpaid_order() {
        let mut order = pending_order();
        assert!(matches!(
            order.ship(None, Utc::now()),
            Err(OrderError::InvalidStateTransition { .. })
        ));
        order.cancel(Utc::now()).unwrap();
        assert!(order.cancel(Utc::now()).is_err());
    }

    #[test]
    fn cancelled_order_is_not_reservable() {
        let mut order = pending_order();
        assert_eq!(OrderError::check_reservable(order.status()), Ok(()));
        order.cancel(Utc::now()).unwrap();
        assert_eq!(
            OrderError::check_reservable(order.status()),
            Err(OrderError::InvalidStateTransition {
                current_state: OrderStatus::Cancelled,
                action: "reserve stock"
            })
        );
    }
}
