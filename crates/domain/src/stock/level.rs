use common::{ProductId, VariantId};
use serde::{Deserialize, Serialize};

use super::StockError;

/// Identifies one stock record: a product, or one variant of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub variant_id: Option<VariantId>,
}

impl StockKey {
    /// Product-level stock.
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id,
            variant_id: None,
        }
    }

    /// Variant-level stock.
    pub fn variant(product_id: ProductId, variant_id: VariantId) -> Self {
        Self {
            product_id,
            variant_id: Some(variant_id),
        }
    }

    pub fn new(product_id: ProductId, variant_id: Option<VariantId>) -> Self {
        Self {
            product_id,
            variant_id,
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.variant_id {
            Some(variant_id) => write!(f, "product {} variant {}", self.product_id, variant_id),
            None => write!(f, "product {}", self.product_id),
        }
    }
}

/// On-hand and reserved quantity for a stock key.
///
/// Every operation validates before mutating, so a failed call leaves the
/// level untouched and `reserved <= quantity` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub key: StockKey,
    quantity: u32,
    reserved: u32,
}

impl StockLevel {
    /// Creates a level with nothing reserved.
    pub fn new(key: StockKey, quantity: u32) -> Self {
        Self {
            key,
            quantity,
            reserved: 0,
        }
    }

    /// Rebuilds a level from persisted values.
    ///
    /// `reserved` is clamped to `quantity` so a corrupt row cannot produce
    /// negative availability.
    pub fn from_parts(key: StockKey, quantity: u32, reserved: u32) -> Self {
        Self {
            key,
            quantity,
            reserved: reserved.min(quantity),
        }
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Units sellable right now.
    pub fn available(&self) -> u32 {
        self.quantity - self.reserved
    }

    pub fn can_reserve(&self, quantity: u32) -> bool {
        quantity > 0 && self.available() >= quantity
    }

    /// Claims `quantity` units for an unconfirmed order.
    pub fn reserve(&mut self, quantity: u32) -> Result<(), StockError> {
        ensure_positive(quantity)?;
        if self.available() < quantity {
            return Err(StockError::InsufficientStock {
                key: self.key,
                available: self.available(),
                requested: quantity,
            });
        }
        self.reserved += quantity;
        Ok(())
    }

    /// Returns claimed units to the available pool. Floors at zero.
    pub fn release(&mut self, quantity: u32) -> Result<(), StockError> {
        ensure_positive(quantity)?;
        self.reserved = self.reserved.saturating_sub(quantity);
        Ok(())
    }

    /// Turns a claim into a sale: both on-hand and reserved drop by `quantity`.
    pub fn confirm(&mut self, quantity: u32) -> Result<(), StockError> {
        ensure_positive(quantity)?;
        if self.quantity < quantity {
            return Err(StockError::InsufficientStock {
                key: self.key,
                available: self.quantity,
                requested: quantity,
            });
        }
        self.quantity -= quantity;
        self.reserved = self.reserved.saturating_sub(quantity);
        Ok(())
    }

    /// Puts sold units back on hand (cancellation after confirmation).
    pub fn restock(&mut self, quantity: u32) -> Result<(), StockError> {
        ensure_positive(quantity)?;
        self.quantity = self.quantity.saturating_add(quantity);
        Ok(())
    }

    /// Admin correction of on-hand stock by a signed delta.
    pub fn adjust(&mut self, delta: i64) -> Result<(), StockError> {
        if delta == 0 {
            return Err(StockError::InvalidQuantity { quantity: 0 });
        }
        let next = i64::from(self.quantity) + delta;
        if next < i64::from(self.reserved) || next > i64::from(u32::MAX) {
            return Err(StockError::NegativeStock {
                key: self.key,
                quantity: self.quantity,
                reserved: self.reserved,
                delta,
            });
        }
        self.quantity = next as u32;
        Ok(())
    }
}

fn ensure_positive(quantity: u32) -> Result<(), StockError> {
    if quantity == 0 {
        return Err(StockError::InvalidQuantity { quantity: 0 });
    }
    Ok(())
}
