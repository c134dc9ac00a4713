//! In-memory storage backend.
//!
//! The reference implementation of the repository traits, used by tests and
//! single-node deployments. Each table is a map behind a
//! `tokio::sync::RwLock`; the payments table additionally maintains the
//! `(user_id, idempotency_key)` index, checked under the same write lock as
//! the insert so that duplicate detection is atomic with respect to other
//! inserts — the in-memory equivalent of a UNIQUE constraint.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId, PaymentId, RefundId, UserId};
use domain::{InventoryRecord, Order, OrderStatus, Payment, ProductId, Refund, RefundStatus};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::{InventoryStore, OrderStore, PaymentStore, RefundStore};

const PAYMENT_KEY_CONSTRAINT: &str = "payments_user_key_unique";

#[derive(Default)]
struct PaymentTable {
    by_id: HashMap<PaymentId, Payment>,
    by_key: HashMap<(UserId, IdempotencyKey), PaymentId>,
}

#[derive(Default)]
struct Inner {
    inventory: RwLock<HashMap<ProductId, InventoryRecord>>,
    orders: RwLock<HashMap<OrderId, Order>>,
    payments: RwLock<PaymentTable>,
    refunds: RwLock<HashMap<RefundId, Refund>>,
}

/// In-memory backend implementing all four repository traits.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted payment rows.
    pub async fn payment_count(&self) -> usize {
        self.inner.payments.read().await.by_id.len()
    }

    /// Total number of persisted refund rows.
    pub async fn refund_count(&self) -> usize {
        self.inner.refunds.read().await.len()
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn insert_inventory(&self, record: &InventoryRecord) -> Result<()> {
        let mut table = self.inner.inventory.write().await;
        if table.contains_key(record.product_id()) {
            return Err(StoreError::DuplicateKey {
                constraint: "inventories_pkey".to_string(),
            });
        }
        table.insert(record.product_id().clone(), record.clone());
        Ok(())
    }

    async fn find_inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>> {
        Ok(self.inner.inventory.read().await.get(product_id).cloned())
    }

    async fn save_inventory(&self, record: &InventoryRecord) -> Result<()> {
        let mut table = self.inner.inventory.write().await;
        match table.get_mut(record.product_id()) {
            Some(row) => {
                *row = record.clone();
                Ok(())
            }
            None => Err(StoreError::RowMissing {
                entity: "inventory",
                id: record.product_id().to_string(),
            }),
        }
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut table = self.inner.orders.write().await;
        if table.contains_key(&order.id()) {
            return Err(StoreError::DuplicateKey {
                constraint: "orders_pkey".to_string(),
            });
        }
        table.insert(order.id(), order.clone());
        Ok(())
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.orders.read().await.get(&id).cloned())
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut table = self.inner.orders.write().await;
        match table.get_mut(&order.id()) {
            Some(row) => {
                *row = order.clone();
                Ok(())
            }
            None => Err(StoreError::RowMissing {
                entity: "order",
                id: order.id().to_string(),
            }),
        }
    }

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let table = self.inner.orders.read().await;
        let mut orders: Vec<_> = table
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at());
        Ok(orders)
    }

    async fn list_orders_created_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderId>> {
        let table = self.inner.orders.read().await;
        let mut ids: Vec<_> = table
            .values()
            .filter(|o| o.status() == status && o.created_at() < cutoff)
            .map(|o| (o.created_at(), o.id()))
            .collect();
        ids.sort_by_key(|(created_at, _)| *created_at);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        let mut table = self.inner.payments.write().await;
        let key = (payment.user_id(), payment.idempotency_key().clone());
        if table.by_key.contains_key(&key) {
            return Err(StoreError::DuplicateKey {
                constraint: PAYMENT_KEY_CONSTRAINT.to_string(),
            });
        }
        table.by_key.insert(key, payment.id());
        table.by_id.insert(payment.id(), payment.clone());
        Ok(())
    }

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.inner.payments.read().await.by_id.get(&id).cloned())
    }

    async fn find_payment_by_key(
        &self,
        user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<Payment>> {
        let table = self.inner.payments.read().await;
        let id = table.by_key.get(&(user_id, key.clone()));
        Ok(id.and_then(|id| table.by_id.get(id)).cloned())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<()> {
        let mut table = self.inner.payments.write().await;
        match table.by_id.get_mut(&payment.id()) {
            Some(row) => {
                *row = payment.clone();
                Ok(())
            }
            None => Err(StoreError::RowMissing {
                entity: "payment",
                id: payment.id().to_string(),
            }),
        }
    }

    async fn list_payments_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let table = self.inner.payments.read().await;
        let mut payments: Vec<_> = table
            .by_id
            .values()
            .filter(|p| p.user_id() == user_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at());
        Ok(payments)
    }
}

#[async_trait]
impl RefundStore for MemoryStore {
    async fn insert_refund(&self, refund: &Refund) -> Result<()> {
        let mut table = self.inner.refunds.write().await;
        if table.contains_key(&refund.id()) {
            return Err(StoreError::DuplicateKey {
                constraint: "refunds_pkey".to_string(),
            });
        }
        table.insert(refund.id(), refund.clone());
        Ok(())
    }

    async fn find_refund(&self, id: RefundId) -> Result<Option<Refund>> {
        Ok(self.inner.refunds.read().await.get(&id).cloned())
    }

    async fn save_refund(&self, refund: &Refund) -> Result<()> {
        let mut table = self.inner.refunds.write().await;
        match table.get_mut(&refund.id()) {
            Some(row) => {
                *row = refund.clone();
                Ok(())
            }
            None => Err(StoreError::RowMissing {
                entity: "refund",
                id: refund.id().to_string(),
            }),
        }
    }

    async fn list_refunds_by_user(&self, user_id: UserId) -> Result<Vec<Refund>> {
        let table = self.inner.refunds.read().await;
        let mut refunds: Vec<_> = table
            .values()
            .filter(|r| r.user_id() == user_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at());
        Ok(refunds)
    }

    async fn list_refunds_by_status(&self, status: RefundStatus) -> Result<Vec<Refund>> {
        let table = self.inner.refunds.read().await;
        let mut refunds: Vec<_> = table
            .values()
            .filter(|r| r.status() == status)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at());
        Ok(refunds)
    }

    async fn list_refunds_by_payment(&self, payment_id: PaymentId) -> Result<Vec<Refund>> {
        let table = self.inner.refunds.read().await;
        let mut refunds: Vec<_> = table
            .values()
            .filter(|r| r.payment_id() == payment_id)
            .cloned()
            .collect();
        refunds.sort_by_key(|r| r.created_at());
        Ok(refunds)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use domain::{Money, OrderLine};

    use super::*;

    fn order_for(user_id: UserId) -> Order {
        let lines = vec![OrderLine::new(
            ProductId::new("SKU-001"),
            "Widget",
            Money::from_cents(1000),
            2,
        )];
        Order::create(user_id, lines, Utc::now())
    }

    #[tokio::test]
    async fn inventory_insert_then_save() {
        let store = MemoryStore::new();
        let product = ProductId::new("SKU-001");
        let mut record = InventoryRecord::new(product.clone(), 10, Utc::now());

        store.insert_inventory(&record).await.unwrap();
        record.reserve(4, Utc::now()).unwrap();
        store.save_inventory(&record).await.unwrap();

        let found = store.find_inventory(&product).await.unwrap().unwrap();
        assert_eq!(found.available(), 6);
        assert_eq!(found.reserved(), 4);
    }

    #[tokio::test]
    async fn inventory_double_insert_fails() {
        let store = MemoryStore::new();
        let record = InventoryRecord::new(ProductId::new("SKU-001"), 10, Utc::now());

        store.insert_inventory(&record).await.unwrap();
        let err = store.insert_inventory(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn save_of_unknown_inventory_fails() {
        let store = MemoryStore::new();
        let record = InventoryRecord::new(ProductId::new("SKU-404"), 10, Utc::now());
        let err = store.save_inventory(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::RowMissing { .. }));
    }

    #[tokio::test]
    async fn payment_key_uniqueness() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let key = IdempotencyKey::new("k1");

        let first = Payment::new(
            user,
            OrderId::new(),
            key.clone(),
            Money::from_cents(5000),
            Utc::now(),
        );
        store.insert_payment(&first).await.unwrap();

        let second = Payment::new(
            user,
            OrderId::new(),
            key.clone(),
            Money::from_cents(5000),
            Utc::now(),
        );
        let err = store.insert_payment(&second).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey { .. }));

        // Same key for a different user is fine.
        let other_user = Payment::new(
            UserId::new(),
            OrderId::new(),
            key.clone(),
            Money::from_cents(100),
            Utc::now(),
        );
        store.insert_payment(&other_user).await.unwrap();

        let found = store
            .find_payment_by_key(user, &key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id(), first.id());
        assert_eq!(store.payment_count().await, 2);
    }

    #[tokio::test]
    async fn orders_listed_per_user() {
        let store = MemoryStore::new();
        let user = UserId::new();

        store.insert_order(&order_for(user)).await.unwrap();
        store.insert_order(&order_for(user)).await.unwrap();
        store.insert_order(&order_for(UserId::new())).await.unwrap();

        assert_eq!(store.list_orders_by_user(user).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn stale_created_orders_are_found() {
        let store = MemoryStore::new();
        let user = UserId::new();

        let stale = order_for(user);
        store.insert_order(&stale).await.unwrap();

        let mut paid = order_for(user);
        paid.mark_paid(Utc::now()).unwrap();
        store.insert_order(&paid).await.unwrap();

        let cutoff = Utc::now() + Duration::minutes(1);
        let ids = store
            .list_orders_created_before(OrderStatus::Created, cutoff)
            .await
            .unwrap();
        assert_eq!(ids, vec![stale.id()]);

        let none = store
            .list_orders_created_before(OrderStatus::Created, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn refunds_queried_by_status_and_payment() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let payment_id = PaymentId::new();

        let refund = Refund::new(
            user,
            payment_id,
            OrderId::new(),
            vec![],
            "reason",
            Utc::now(),
        );
        store.insert_refund(&refund).await.unwrap();

        assert_eq!(
            store
                .list_refunds_by_status(RefundStatus::Requested)
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(
            store
                .list_refunds_by_status(RefundStatus::Completed)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store
                .list_refunds_by_payment(payment_id)
                .await
                .unwrap()
                .len(),
            1
        );
        assert_eq!(store.list_refunds_by_user(user).await.unwrap().len(), 1);
    }
}
