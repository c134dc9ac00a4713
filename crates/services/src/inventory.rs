//! Inventory ledger: per-product counters under exclusive row locks.

use std::sync::Arc;

use common::Clock;
use domain::{InventoryRecord, ProductId};
use store::{InventoryStore, KeyedMutex, StoreError};

use crate::error::{Result, ServiceError};

/// Service wrapping the reservation arithmetic in per-product locking.
///
/// Every mutation acquires the exclusive lock for the product, loads the
/// record, applies the arithmetic and writes it back. The lock covers only
/// that cycle — never a surrounding business flow — so two reservations on
/// different products never contend, and two on the same product serialize
/// with the loser observing the updated counters.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn InventoryStore>,
    locks: Arc<KeyedMutex<ProductId>>,
    clock: Arc<dyn Clock>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedMutex::new()),
            clock,
        }
    }

    /// Creates an empty inventory record for a product.
    #[tracing::instrument(skip(self))]
    pub async fn initialize(&self, product_id: ProductId) -> Result<InventoryRecord> {
        let record = InventoryRecord::new(product_id.clone(), 0, self.clock.now());
        match self.store.insert_inventory(&record).await {
            Ok(()) => Ok(record),
            Err(StoreError::DuplicateKey { .. }) => Err(ServiceError::Validation(format!(
                "inventory already exists for product {product_id}"
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Adds stock to the available pool.
    #[tracing::instrument(skip(self))]
    pub async fn add_stock(&self, product_id: &ProductId, quantity: u32) -> Result<InventoryRecord> {
        ensure_positive(quantity)?;
        let _guard = self.locks.acquire(product_id.clone()).await;

        let mut record = self.load(product_id).await?;
        record.add_stock(quantity, self.clock.now());
        self.store.save_inventory(&record).await?;

        tracing::info!(%product_id, quantity, available = record.available(), "stock added");
        Ok(record)
    }

    /// Moves stock from available to reserved, failing fast when there is
    /// not enough.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        ensure_positive(quantity)?;
        let _guard = self.locks.acquire(product_id.clone()).await;

        let mut record = self.load(product_id).await?;
        record.reserve(quantity, self.clock.now())?;
        self.store.save_inventory(&record).await?;

        metrics::counter!("inventory_reservations_total").increment(1);
        Ok(())
    }

    /// Returns reserved stock to the available pool.
    #[tracing::instrument(skip(self))]
    pub async fn release(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        ensure_positive(quantity)?;
        let _guard = self.locks.acquire(product_id.clone()).await;

        let mut record = self.load(product_id).await?;
        record.release(quantity, self.clock.now())?;
        self.store.save_inventory(&record).await?;

        metrics::counter!("inventory_releases_total").increment(1);
        Ok(())
    }

    /// Permanently consumes reserved stock on fulfillment.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(&self, product_id: &ProductId, quantity: u32) -> Result<()> {
        ensure_positive(quantity)?;
        let _guard = self.locks.acquire(product_id.clone()).await;

        let mut record = self.load(product_id).await?;
        record.confirm(quantity, self.clock.now())?;
        self.store.save_inventory(&record).await?;

        metrics::counter!("inventory_confirmations_total").increment(1);
        Ok(())
    }

    /// Current counters for a product.
    pub async fn get_by_product(&self, product_id: &ProductId) -> Result<InventoryRecord> {
        self.load(product_id).await
    }

    async fn load(&self, product_id: &ProductId) -> Result<InventoryRecord> {
        self.store
            .find_inventory(product_id)
            .await?
            .ok_or_else(|| ServiceError::InventoryNotFound(product_id.clone()))
    }
}

fn ensure_positive(quantity: u32) -> Result<()> {
    if quantity == 0 {
        return Err(ServiceError::Validation(
            "quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use common::SystemClock;
    use domain::DomainError;
    use store::MemoryStore;

    use super::*;

    fn ledger() -> InventoryLedger {
        InventoryLedger::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    async fn stocked(ledger: &InventoryLedger, product: &ProductId, quantity: u32) {
        ledger.initialize(product.clone()).await.unwrap();
        ledger.add_stock(product, quantity).await.unwrap();
    }

    #[tokio::test]
    async fn initialize_starts_empty() {
        let ledger = ledger();
        let record = ledger.initialize(ProductId::new("SKU-001")).await.unwrap();
        assert_eq!(record.available(), 0);
        assert_eq!(record.reserved(), 0);
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let ledger = ledger();
        let product = ProductId::new("SKU-001");
        ledger.initialize(product.clone()).await.unwrap();

        let err = ledger.initialize(product).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn reserve_release_roundtrip() {
        let ledger = ledger();
        let product = ProductId::new("SKU-001");
        stocked(&ledger, &product, 10).await;

        ledger.reserve(&product, 6).await.unwrap();
        let record = ledger.get_by_product(&product).await.unwrap();
        assert_eq!((record.available(), record.reserved()), (4, 6));

        ledger.release(&product, 6).await.unwrap();
        let record = ledger.get_by_product(&product).await.unwrap();
        assert_eq!((record.available(), record.reserved()), (10, 0));
    }

    #[tokio::test]
    async fn oversized_reserve_fails_and_leaves_state() {
        let ledger = ledger();
        let product = ProductId::new("SKU-001");
        stocked(&ledger, &product, 10).await;

        ledger.reserve(&product, 6).await.unwrap();
        let err = ledger.reserve(&product, 6).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InsufficientInventory { .. })
        ));

        let record = ledger.get_by_product(&product).await.unwrap();
        assert_eq!((record.available(), record.reserved()), (4, 6));
    }

    #[tokio::test]
    async fn confirm_consumes_total() {
        let ledger = ledger();
        let product = ProductId::new("SKU-001");
        stocked(&ledger, &product, 10).await;

        ledger.reserve(&product, 4).await.unwrap();
        ledger.confirm(&product, 4).await.unwrap();

        let record = ledger.get_by_product(&product).await.unwrap();
        assert_eq!(record.total(), 6);
        assert_eq!(record.reserved(), 0);
    }

    #[tokio::test]
    async fn zero_quantity_is_a_validation_error() {
        let ledger = ledger();
        let product = ProductId::new("SKU-001");
        stocked(&ledger, &product, 10).await;

        for result in [
            ledger.reserve(&product, 0).await,
            ledger.release(&product, 0).await,
            ledger.confirm(&product, 0).await,
        ] {
            assert!(matches!(result, Err(ServiceError::Validation(_))));
        }
        assert!(matches!(
            ledger.add_stock(&product, 0).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn unknown_product_fails() {
        let ledger = ledger();
        let err = ledger
            .reserve(&ProductId::new("SKU-404"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InventoryNotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_reserves_never_oversell() {
        let ledger = ledger();
        let product = ProductId::new("SKU-001");
        stocked(&ledger, &product, 10).await;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            let product = product.clone();
            handles.push(tokio::spawn(
                async move { ledger.reserve(&product, 6).await },
            ));
        }

        let mut successes = 0;
        let mut failures = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => successes += 1,
                Err(ServiceError::Domain(DomainError::InsufficientInventory { .. })) => {
                    failures += 1
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(failures, 9);

        let record = ledger.get_by_product(&product).await.unwrap();
        assert_eq!((record.available(), record.reserved()), (4, 6));
        assert_eq!(record.total(), 10);
    }
}
