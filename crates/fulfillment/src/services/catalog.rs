//! Read access to products and variants.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use common::{ProductId, VariantId};
use domain::{ProductSnapshot, VariantSnapshot};

use crate::error::Result;

/// Source of current product visibility and pricing.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>>;

    async fn variant(&self, id: VariantId) -> Result<Option<VariantSnapshot>>;
}

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, ProductSnapshot>,
    variants: HashMap<VariantId, VariantSnapshot>,
}

/// In-memory catalog for testing.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a product.
    pub fn put_product(&self, product: ProductSnapshot) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .products
            .insert(product.id, product);
    }

    /// Inserts or replaces a variant.
    pub fn put_variant(&self, variant: VariantSnapshot) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .variants
            .insert(variant.id, variant);
    }

    pub fn remove_product(&self, id: ProductId) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.products.remove(&id);
        state.variants.retain(|_, v| v.product_id != id);
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, id: ProductId) -> Result<Option<ProductSnapshot>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.products.get(&id).cloned())
    }

    async fn variant(&self, id: VariantId) -> Result<Option<VariantSnapshot>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.variants.get(&id).cloned())
    }
}
