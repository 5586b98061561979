//! Shopping carts.

mod validation;

pub use validation::{
    CartValidation, CheckoutIssue, IssueKind, LineFacts, PRICE_DRIFT_THRESHOLD, price_drift_exceeds,
};

use chrono::{DateTime, Utc};
use common::{CartId, Money, ProductId, TenantId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reservation::ReservationLine;
use crate::stock::StockKey;

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Item not found in cart: {key}")]
    ItemNotFound { key: StockKey },

    #[error("Cart is empty")]
    Empty,
}

/// A cart line. `price_snapshot` is the unit price captured when the item
/// was added and is what the shopper is charged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
    pub quantity: u32,
    pub price_snapshot: Money,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn new(
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
        price_snapshot: Money,
    ) -> Self {
        Self {
            product_id,
            variant_id,
            quantity,
            price_snapshot,
            added_at: Utc::now(),
        }
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.variant_id)
    }

    pub fn line_total(&self) -> Money {
        self.price_snapshot.multiply(self.quantity)
    }
}

/// The active cart of one user within one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    items: Vec<CartItem>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(tenant_id: TenantId, user_id: UserId) -> Self {
        Self {
            id: CartId::new(),
            tenant_id,
            user_id,
            items: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Rebuilds a cart from persisted values.
    pub fn restore(
        id: CartId,
        tenant_id: TenantId,
        user_id: UserId,
        items: Vec<CartItem>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            user_id,
            items,
            updated_at,
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, key: &StockKey) -> Option<&CartItem> {
        self.items.iter().find(|i| &i.key() == key)
    }

    /// Quantity already in the cart for a stock key.
    pub fn quantity_of(&self, key: &StockKey) -> u32 {
        self.item(key).map(|i| i.quantity).unwrap_or(0)
    }

    /// Σ price_snapshot × quantity.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Adds an item, merging with an existing line for the same stock key.
    /// The merged line takes the newer price snapshot.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity: 0 });
        }
        let key = item.key();
        match self.items.iter_mut().find(|i| i.key() == key) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(item.quantity);
                existing.price_snapshot = item.price_snapshot;
            }
            None => self.items.push(item),
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Sets the quantity of an existing line; zero removes it.
    pub fn set_quantity(&mut self, key: &StockKey, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(key);
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| &i.key() == key)
            .ok_or(CartError::ItemNotFound { key: *key })?;
        item.quantity = quantity;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn remove_item(&mut self, key: &StockKey) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| &i.key() != key);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound { key: *key });
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.updated_at = Utc::now();
    }

    /// Lines to reserve when this cart becomes an order.
    pub fn reservation_lines(&self) -> Vec<ReservationLine> {
        self.items
            .iter()
            .map(|i| ReservationLine::new(i.key(), i.quantity))
            .collect()
    }
}
