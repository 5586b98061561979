//! Cart mutations and the pre-checkout consistency check.

use std::sync::Arc;
use std::time::Duration;

use common::{CartId, Money, ProductId, TenantId, UserId, VariantId};
use domain::{Cart, CartItem, CartValidation, LineFacts, ProductSnapshot, StockKey};
use store::{CartStore, StockStore};

use crate::DEFAULT_CALL_TIMEOUT;
use crate::error::{FulfillmentError, Result, bounded};
use crate::services::{Catalog, TenantGuard};

/// Re-checks each cart line against the catalog and the stock ledger.
#[derive(Clone)]
pub struct CartValidator<S> {
    store: S,
    catalog: Arc<dyn Catalog>,
    call_timeout: Duration,
}

impl<S: StockStore> CartValidator<S> {
    pub fn new(store: S, catalog: Arc<dyn Catalog>) -> Self {
        Self {
            store,
            catalog,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Errors for missing, unpublished or out-of-stock lines; warnings for
    /// price drift above 10%.
    #[tracing::instrument(skip(self, cart), fields(cart_id = %cart.id, items = cart.items().len()))]
    pub async fn validate_for_checkout(&self, cart: &Cart) -> Result<CartValidation> {
        if cart.is_empty() {
            return Err(FulfillmentError::EmptyCart);
        }

        let mut report = CartValidation::new();
        for item in cart.items() {
            let facts = self.facts_for(item).await?;
            report.check_line(cart.tenant_id, item, &facts);
        }

        if !report.is_valid() {
            tracing::info!(
                cart_id = %cart.id,
                errors = report.errors.len(),
                warnings = report.warnings.len(),
                "cart failed checkout validation"
            );
        }
        Ok(report)
    }

    async fn facts_for(&self, item: &CartItem) -> Result<LineFacts> {
        let product = bounded(
            "catalog_product",
            self.call_timeout,
            self.catalog.product(item.product_id),
        )
        .await?;
        let variant = match item.variant_id {
            Some(variant_id) => {
                bounded(
                    "catalog_variant",
                    self.call_timeout,
                    self.catalog.variant(variant_id),
                )
                .await?
            }
            None => None,
        };
        let stock = bounded(
            "stock_level",
            self.call_timeout,
            self.store.stock_level(item.key()),
        )
        .await?;
        Ok(LineFacts {
            product,
            variant,
            stock,
        })
    }
}

/// Add, update and remove cart items for a user within a tenant.
///
/// Quantities are checked against available stock at mutation time; prices
/// are snapshotted when an item is added.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
    catalog: Arc<dyn Catalog>,
    tenants: Arc<dyn TenantGuard>,
    call_timeout: Duration,
}

impl<S> CartService<S>
where
    S: CartStore + StockStore,
{
    pub fn new(store: S, catalog: Arc<dyn Catalog>, tenants: Arc<dyn TenantGuard>) -> Self {
        Self {
            store,
            catalog,
            tenants,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The user's active cart, created empty on first use.
    #[tracing::instrument(skip(self))]
    pub async fn active_cart(&self, tenant_id: TenantId, user_id: UserId) -> Result<Cart> {
        self.tenants.ensure_access(tenant_id).await?;
        self.load_or_create(tenant_id, user_id).await
    }

    pub async fn cart(&self, tenant_id: TenantId, cart_id: CartId) -> Result<Cart> {
        self.tenants.ensure_access(tenant_id).await?;
        bounded("cart", self.call_timeout, self.store.cart(cart_id))
            .await?
            .filter(|c| c.tenant_id == tenant_id)
            .ok_or_else(|| FulfillmentError::not_found("cart", cart_id))
    }

    /// Adds `quantity` of a product (or one of its variants), snapshotting
    /// the current price.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
        quantity: u32,
    ) -> Result<Cart> {
        self.tenants.ensure_access(tenant_id).await?;
        if quantity == 0 {
            return Err(FulfillmentError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }

        let price = self.current_price(tenant_id, product_id, variant_id).await?;
        let mut cart = self.load_or_create(tenant_id, user_id).await?;
        let key = StockKey::new(product_id, variant_id);
        let wanted = cart.quantity_of(&key).saturating_add(quantity);
        self.ensure_in_stock(key, wanted).await?;

        cart.add_item(CartItem::new(product_id, variant_id, quantity, price))?;
        bounded("save_cart", self.call_timeout, self.store.save_cart(&cart)).await?;
        tracing::info!(cart_id = %cart.id, %key, quantity, %price, "item added to cart");
        Ok(cart)
    }

    /// Sets a line's quantity; zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        key: StockKey,
        quantity: u32,
    ) -> Result<Cart> {
        self.tenants.ensure_access(tenant_id).await?;
        let mut cart = self.load_or_create(tenant_id, user_id).await?;
        if quantity > 0 {
            if cart.item(&key).is_none() {
                return Err(FulfillmentError::not_found("cart item", key));
            }
            self.ensure_in_stock(key, quantity).await?;
        }

        cart.set_quantity(&key, quantity)?;
        bounded("save_cart", self.call_timeout, self.store.save_cart(&cart)).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        key: StockKey,
    ) -> Result<Cart> {
        self.tenants.ensure_access(tenant_id).await?;
        let mut cart = self.load_or_create(tenant_id, user_id).await?;
        cart.remove_item(&key)?;
        bounded("save_cart", self.call_timeout, self.store.save_cart(&cart)).await?;
        Ok(cart)
    }

    /// Puts items back into the user's active cart with their original
    /// price snapshots. Stock is not checked; the next checkout validates it.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn restore_items(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        items: Vec<CartItem>,
    ) -> Result<Cart> {
        let mut cart = self.load_or_create(tenant_id, user_id).await?;
        for item in items {
            cart.add_item(item)?;
        }
        bounded("save_cart", self.call_timeout, self.store.save_cart(&cart)).await?;
        tracing::info!(cart_id = %cart.id, "order lines returned to cart");
        Ok(cart)
    }

    async fn load_or_create(&self, tenant_id: TenantId, user_id: UserId) -> Result<Cart> {
        let existing = bounded(
            "active_cart",
            self.call_timeout,
            self.store.active_cart(tenant_id, user_id),
        )
        .await?;
        match existing {
            Some(cart) => Ok(cart),
            None => {
                let cart = Cart::new(tenant_id, user_id);
                bounded("save_cart", self.call_timeout, self.store.save_cart(&cart)).await?;
                Ok(cart)
            }
        }
    }

    async fn current_price(
        &self,
        tenant_id: TenantId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<Money> {
        let product: ProductSnapshot = bounded(
            "catalog_product",
            self.call_timeout,
            self.catalog.product(product_id),
        )
        .await?
        .filter(|p| p.tenant_id == tenant_id && p.published)
        .ok_or_else(|| FulfillmentError::not_found("product", product_id))?;

        match variant_id {
            Some(variant_id) => {
                let variant = bounded(
                    "catalog_variant",
                    self.call_timeout,
                    self.catalog.variant(variant_id),
                )
                .await?
                .filter(|v| v.product_id == product_id)
                .ok_or_else(|| FulfillmentError::not_found("variant", variant_id))?;
                Ok(variant.current_price(&product))
            }
            None => Ok(product.current_price()),
        }
    }

    async fn ensure_in_stock(&self, key: StockKey, wanted: u32) -> Result<()> {
        let available = bounded("stock_level", self.call_timeout, self.store.stock_level(key))
            .await?
            .map(|level| level.available())
            .unwrap_or(0);
        if available < wanted {
            return Err(FulfillmentError::InsufficientStock {
                key,
                available,
                requested: wanted,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{IssueKind, VariantSnapshot};
    use store::InMemoryStore;

    use crate::services::{InMemoryCatalog, InMemoryTenantGuard};

    struct Fixture {
        store: InMemoryStore,
        catalog: Arc<InMemoryCatalog>,
        carts: CartService<InMemoryStore>,
        validator: CartValidator<InMemoryStore>,
        tenant_id: TenantId,
        user_id: UserId,
    }

    impl Fixture {
        fn new() -> Self {
            let store = InMemoryStore::new();
            let catalog = Arc::new(InMemoryCatalog::new());
            let tenants = Arc::new(InMemoryTenantGuard::allow_all());
            Self {
                carts: CartService::new(store.clone(), catalog.clone(), tenants),
                validator: CartValidator::new(store.clone(), catalog.clone()),
                store,
                catalog,
                tenant_id: TenantId::new(),
                user_id: UserId::new(),
            }
        }

        async fn product(&self, price: Money, stock: u32) -> ProductSnapshot {
            let product = ProductSnapshot {
                id: ProductId::new(),
                tenant_id: self.tenant_id,
                name: "Lamp".to_string(),
                published: true,
                base_price: price,
                sale_price: None,
            };
            self.catalog.put_product(product.clone());
            self.store
                .put_stock(StockKey::product(product.id), stock)
                .await
                .unwrap();
            product
        }

        async fn add(&self, product_id: ProductId, quantity: u32) -> Result<Cart> {
            self.carts
                .add_item(self.tenant_id, self.user_id, product_id, None, quantity)
                .await
        }
    }

    #[tokio::test]
    async fn add_item_snapshots_price_and_merges() {
        let fx = Fixture::new();
        let lamp = fx.product(Money::from_major(40), 10).await;

        fx.add(lamp.id, 2).await.unwrap();
        let cart = fx.add(lamp.id, 3).await.unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 5);
        assert_eq!(cart.items()[0].price_snapshot, Money::from_major(40));
        assert_eq!(cart.subtotal(), Money::from_major(200));
    }

    #[tokio::test]
    async fn add_item_beyond_available_is_rejected() {
        let fx = Fixture::new();
        let lamp = fx.product(Money::from_major(40), 3).await;

        fx.add(lamp.id, 2).await.unwrap();
        let err = fx.add(lamp.id, 2).await.unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::InsufficientStock {
                available: 3,
                requested: 4,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unpublished_or_foreign_products_cannot_be_added() {
        let fx = Fixture::new();
        let mut hidden = fx.product(Money::from_major(10), 5).await;
        hidden.published = false;
        fx.catalog.put_product(hidden.clone());

        assert!(matches!(
            fx.add(hidden.id, 1).await,
            Err(FulfillmentError::NotFound { .. })
        ));

        let mut foreign = fx.product(Money::from_major(10), 5).await;
        foreign.tenant_id = TenantId::new();
        fx.catalog.put_product(foreign.clone());
        assert!(matches!(
            fx.add(foreign.id, 1).await,
            Err(FulfillmentError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn variant_price_wins_over_product_price() {
        let fx = Fixture::new();
        let lamp = fx.product(Money::from_major(40), 0).await;
        let variant = VariantSnapshot {
            id: VariantId::new(),
            product_id: lamp.id,
            name: "Brass".to_string(),
            price: Some(Money::from_major(55)),
        };
        fx.catalog.put_variant(variant.clone());
        fx.store
            .put_stock(StockKey::variant(lamp.id, variant.id), 2)
            .await
            .unwrap();

        let cart = fx
            .carts
            .add_item(fx.tenant_id, fx.user_id, lamp.id, Some(variant.id), 1)
            .await
            .unwrap();
        assert_eq!(cart.items()[0].price_snapshot, Money::from_major(55));
    }

    #[tokio::test]
    async fn update_to_zero_removes_the_line() {
        let fx = Fixture::new();
        let lamp = fx.product(Money::from_major(40), 10).await;
        fx.add(lamp.id, 2).await.unwrap();

        let key = StockKey::product(lamp.id);
        let cart = fx
            .carts
            .update_item(fx.tenant_id, fx.user_id, key, 0)
            .await
            .unwrap();
        assert!(cart.is_empty());

        let err = fx
            .carts
            .remove_item(fx.tenant_id, fx.user_id, key)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fifteen_percent_drift_is_a_warning_not_an_error() {
        let fx = Fixture::new();
        let mut lamp = fx.product(Money::from_major(100), 10).await;
        let cart = fx.add(lamp.id, 1).await.unwrap();

        lamp.base_price = Money::from_major(115);
        fx.catalog.put_product(lamp);

        let report = fx.validator.validate_for_checkout(&cart).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(
            report.warnings[0].kind,
            IssueKind::PriceDrift {
                previous: Money::from_major(100),
                current: Money::from_major(115),
            }
        );
    }

    #[tokio::test]
    async fn stock_drop_after_add_is_an_error() {
        let fx = Fixture::new();
        let lamp = fx.product(Money::from_major(20), 5).await;
        let cart = fx.add(lamp.id, 4).await.unwrap();
        fx.store
            .put_stock(StockKey::product(lamp.id), 2)
            .await
            .unwrap();

        let report = fx.validator.validate_for_checkout(&cart).await.unwrap();
        assert!(!report.is_valid());
        assert_eq!(
            report.errors[0].kind,
            IssueKind::InsufficientStock {
                available: 2,
                requested: 4,
            }
        );
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let fx = Fixture::new();
        let cart = fx.carts.active_cart(fx.tenant_id, fx.user_id).await.unwrap();
        assert!(matches!(
            fx.validator.validate_for_checkout(&cart).await,
            Err(FulfillmentError::EmptyCart)
        ));
    }

    #[tokio::test]
    async fn denied_tenant_cannot_touch_carts() {
        let store = InMemoryStore::new();
        let carts = CartService::new(
            store,
            Arc::new(InMemoryCatalog::new()),
            Arc::new(InMemoryTenantGuard::new()),
        );
        let err = carts
            .active_cart(TenantId::new(), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::Forbidden(_)));
    }
}
