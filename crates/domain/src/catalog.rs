//! Read-only views of data owned by collaborators (catalog, address book).

use common::{AddressId, Money, ProductId, TenantId, UserId, VariantId};
use serde::{Deserialize, Serialize};

/// Product as seen by checkout: visibility and current pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: ProductId,
    pub tenant_id: TenantId,
    pub name: String,
    pub published: bool,
    pub base_price: Money,
    pub sale_price: Option<Money>,
}

impl ProductSnapshot {
    /// Sale price when one is set, otherwise the base price.
    pub fn current_price(&self) -> Money {
        self.sale_price
            .filter(Money::is_positive)
            .unwrap_or(self.base_price)
    }
}

/// A purchasable variant. A variant without its own price sells at the
/// product's current price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub id: VariantId,
    pub product_id: ProductId,
    pub name: String,
    pub price: Option<Money>,
}

impl VariantSnapshot {
    pub fn current_price(&self, product: &ProductSnapshot) -> Money {
        self.price.unwrap_or_else(|| product.current_price())
    }
}

/// Postal address owned by a user, copied onto orders at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub recipient: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(sale_price: Option<Money>) -> ProductSnapshot {
        ProductSnapshot {
            id: ProductId::new(),
            tenant_id: TenantId::new(),
            name: "Widget".to_string(),
            published: true,
            base_price: Money::from_major(100),
            sale_price,
        }
    }

    #[test]
    fn sale_price_wins_over_base_price() {
        assert_eq!(product(None).current_price(), Money::from_major(100));
        assert_eq!(
            product(Some(Money::from_major(80))).current_price(),
            Money::from_major(80)
        );
        assert_eq!(
            product(Some(Money::zero())).current_price(),
            Money::from_major(100)
        );
    }

    #[test]
    fn variant_price_overrides_product_price() {
        let product = product(Some(Money::from_major(80)));
        let mut variant = VariantSnapshot {
            id: VariantId::new(),
            product_id: product.id,
            name: "Large".to_string(),
            price: None,
        };
        assert_eq!(variant.current_price(&product), Money::from_major(80));

        variant.price = Some(Money::from_major(120));
        assert_eq!(variant.current_price(&product), Money::from_major(120));
    }
}
