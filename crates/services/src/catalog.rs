//! Catalog lookup collaborator.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::{Money, ProductId};

use crate::error::{Result, ServiceError};

/// Product data consumed at order creation to build line snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub id: ProductId,
    pub name: String,
    pub unit_price: Money,
}

/// Read-only product lookup.
///
/// Catalog management itself is outside this system; orders only need the
/// name and price at the moment of creation.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the product, or `ProductNotFound`.
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductInfo>;
}

/// In-memory catalog for tests and demo deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<RwLock<HashMap<ProductId, ProductInfo>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub fn put(&self, product_id: ProductId, name: impl Into<String>, unit_price: Money) {
        let info = ProductInfo {
            id: product_id.clone(),
            name: name.into(),
            unit_price,
        };
        self.products.write().unwrap().insert(product_id, info);
    }

    /// Number of listed products.
    pub fn len(&self) -> usize {
        self.products.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.read().unwrap().is_empty()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, product_id: &ProductId) -> Result<ProductInfo> {
        self.products
            .read()
            .unwrap()
            .get(product_id)
            .cloned()
            .ok_or_else(|| ServiceError::ProductNotFound(product_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_listed_product() {
        let catalog = InMemoryCatalog::new();
        catalog.put(ProductId::new("SKU-001"), "Widget", Money::from_cents(1000));

        let info = catalog.get_product(&ProductId::new("SKU-001")).await.unwrap();
        assert_eq!(info.name, "Widget");
        assert_eq!(info.unit_price.cents(), 1000);
    }

    #[tokio::test]
    async fn lookup_of_unknown_product_fails() {
        let catalog = InMemoryCatalog::new();
        let err = catalog.get_product(&ProductId::new("SKU-404")).await.unwrap_err();
        assert!(matches!(err, ServiceError::ProductNotFound(_)));
    }
}
