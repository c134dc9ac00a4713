//! Repository traits and backend wiring.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId, PaymentId, RefundId, UserId};
use domain::{InventoryRecord, Order, OrderStatus, Payment, ProductId, Refund, RefundStatus};

use crate::error::Result;
use crate::memory::MemoryStore;
use crate::postgres::PgStore;

/// Per-product stock counters.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Inserts a new record; fails with `DuplicateKey` if the product
    /// already has one.
    async fn insert_inventory(&self, record: &InventoryRecord) -> Result<()>;

    async fn find_inventory(&self, product_id: &ProductId) -> Result<Option<InventoryRecord>>;

    /// Writes back a record previously loaded under the row lock.
    async fn save_inventory(&self, record: &InventoryRecord) -> Result<()>;
}

/// Orders and their line snapshots.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Writes back the order header; lines are immutable after insert.
    async fn save_order(&self, order: &Order) -> Result<()>;

    async fn list_orders_by_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Orders in the given status created strictly before `cutoff`,
    /// for the expiration sweep.
    async fn list_orders_created_before(
        &self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderId>>;
}

/// Payment records keyed by id and by `(user_id, idempotency_key)`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a new payment, enforcing the `(user_id, idempotency_key)`
    /// uniqueness constraint. A `DuplicateKey` error means a concurrent
    /// request already persisted a payment for the same key; the caller is
    /// expected to re-query and return that record.
    async fn insert_payment(&self, payment: &Payment) -> Result<()>;

    async fn find_payment(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_payment_by_key(
        &self,
        user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<Payment>>;

    async fn save_payment(&self, payment: &Payment) -> Result<()>;

    async fn list_payments_by_user(&self, user_id: UserId) -> Result<Vec<Payment>>;
}

/// Refund records and their line snapshots.
#[async_trait]
pub trait RefundStore: Send + Sync {
    async fn insert_refund(&self, refund: &Refund) -> Result<()>;

    async fn find_refund(&self, id: RefundId) -> Result<Option<Refund>>;

    /// Writes back the refund header; lines are immutable after insert.
    async fn save_refund(&self, refund: &Refund) -> Result<()>;

    async fn list_refunds_by_user(&self, user_id: UserId) -> Result<Vec<Refund>>;

    async fn list_refunds_by_status(&self, status: RefundStatus) -> Result<Vec<Refund>>;

    /// All refunds against one payment, any status. The refund ledger
    /// recomputes per-line totals from this on every request.
    async fn list_refunds_by_payment(&self, payment_id: PaymentId) -> Result<Vec<Refund>>;
}

/// The four repositories of one storage backend.
///
/// Both backends implement every trait on a single cloneable struct; this
/// bundle hands them out as separate trait objects so services only see the
/// tables they own.
#[derive(Clone)]
pub struct Backend {
    pub inventory: Arc<dyn InventoryStore>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub refunds: Arc<dyn RefundStore>,
}

impl Backend {
    /// In-memory backend for tests and single-node demo deployments.
    pub fn in_memory() -> Self {
        let store = MemoryStore::new();
        Self {
            inventory: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            refunds: Arc::new(store),
        }
    }

    /// PostgreSQL backend.
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        let store = PgStore::new(pool);
        Self {
            inventory: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            refunds: Arc::new(store),
        }
    }
}
