//! Order service: creation with catalog snapshots and reservation, and the
//! guarded lifecycle transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Clock, OrderId, UserId};
use domain::{Order, OrderLine, OrderStatus, ProductId};
use store::{KeyedMutex, OrderStore};

use crate::catalog::Catalog;
use crate::error::{Result, ServiceError};
use crate::inventory::InventoryLedger;

/// One requested line of a new order.
#[derive(Debug, Clone)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Order lifecycle service.
///
/// Status mutations go through the per-order row lock: the settlement
/// worker, the expiration sweep and a live user request can all target the
/// same order, and the lock plus the domain guards make each transition
/// happen at most once.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    locks: Arc<KeyedMutex<OrderId>>,
    inventory: InventoryLedger,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        inventory: InventoryLedger,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedMutex::new()),
            inventory,
            catalog,
            clock,
        }
    }

    /// Creates an order: snapshots each product from the catalog, reserves
    /// its stock, then persists the order in `Created`.
    ///
    /// Reservation happens line by line; when a later line fails (unknown
    /// product, insufficient stock), the lines reserved so far are released
    /// again before the error propagates, so a rejected order never holds
    /// stock.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, user_id: UserId, lines: Vec<OrderLineRequest>) -> Result<Order> {
        if lines.is_empty() {
            return Err(ServiceError::Validation(
                "order must have at least one line".to_string(),
            ));
        }
        for line in &lines {
            if line.quantity == 0 {
                return Err(ServiceError::Validation(
                    "line quantity must be positive".to_string(),
                ));
            }
        }

        let mut snapshots: Vec<OrderLine> = Vec::with_capacity(lines.len());
        for request in lines {
            let product = match self.catalog.get_product(&request.product_id).await {
                Ok(product) => product,
                Err(e) => {
                    self.release_lines(&snapshots).await;
                    return Err(e);
                }
            };
            if let Err(e) = self.inventory.reserve(&request.product_id, request.quantity).await {
                self.release_lines(&snapshots).await;
                return Err(e);
            }
            snapshots.push(OrderLine::new(
                product.id,
                product.name,
                product.unit_price,
                request.quantity,
            ));
        }

        let order = Order::create(user_id, snapshots, self.clock.now());
        if let Err(e) = self.store.insert_order(&order).await {
            self.release_lines(order.lines()).await;
            return Err(e.into());
        }

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            %user_id,
            total = %order.total_amount(),
            lines = order.lines().len(),
            "order created"
        );
        Ok(order)
    }

    /// Cancels an unpaid order and returns its reservations.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.load_for_user(order_id, user_id).await?;
        order.cancel(self.clock.now())?;
        self.store.save_order(&order).await?;
        self.release_lines(order.lines()).await;

        tracing::info!(%order_id, "order canceled");
        Ok(order)
    }

    /// Marks an order paid; called by the orchestrator on settlement
    /// success.
    #[tracing::instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: OrderId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.load(order_id).await?;
        order.mark_paid(self.clock.now())?;
        self.store.save_order(&order).await?;
        Ok(order)
    }

    /// Completes a paid order, consuming its reservations for good.
    #[tracing::instrument(skip(self))]
    pub async fn complete(&self, order_id: OrderId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.load(order_id).await?;
        order.complete(self.clock.now())?;
        for line in order.lines() {
            if let Err(e) = self.inventory.confirm(&line.product_id, line.quantity).await {
                tracing::error!(
                    %order_id,
                    product_id = %line.product_id,
                    error = %e,
                    "stock confirmation failed; order stays PAID"
                );
                return Err(e);
            }
        }
        self.store.save_order(&order).await?;

        metrics::counter!("orders_completed_total").increment(1);
        tracing::info!(%order_id, "order completed");
        Ok(order)
    }

    /// Expires a stale unpaid order.
    ///
    /// Returns `Ok(false)` without touching anything when the status has
    /// already moved on — a concurrent payment or cancellation resolved the
    /// order between the sweep's query and this call.
    #[tracing::instrument(skip(self))]
    pub async fn expire(&self, order_id: OrderId) -> Result<bool> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.load(order_id).await?;
        if order.status() != OrderStatus::Created {
            return Ok(false);
        }
        order.expire(self.clock.now())?;
        self.store.save_order(&order).await?;
        self.release_lines(order.lines()).await;

        metrics::counter!("orders_expired_total").increment(1);
        tracing::info!(%order_id, "order expired");
        Ok(true)
    }

    /// Moves a paid order into the refund flow.
    #[tracing::instrument(skip(self))]
    pub async fn request_refund(&self, order_id: OrderId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.load(order_id).await?;
        order.request_refund(self.clock.now())?;
        self.store.save_order(&order).await?;
        Ok(order)
    }

    /// Marks an order fully refunded.
    #[tracing::instrument(skip(self))]
    pub async fn mark_refunded(&self, order_id: OrderId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await;

        let mut order = self.load(order_id).await?;
        order.mark_refunded(self.clock.now())?;
        self.store.save_order(&order).await?;

        tracing::info!(%order_id, "order fully refunded");
        Ok(order)
    }

    /// Loads an order without an ownership check, for internal flows.
    pub async fn get_by_id(&self, order_id: OrderId) -> Result<Order> {
        self.load(order_id).await
    }

    /// Loads an order scoped to its owner.
    pub async fn get_by_id_for_user(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        self.load_for_user(order_id, user_id).await
    }

    /// All orders of one user, oldest first.
    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_by_user(user_id).await?)
    }

    /// Unpaid orders created before `cutoff`, for the expiration sweep.
    pub async fn expired_candidates(&self, cutoff: DateTime<Utc>) -> Result<Vec<OrderId>> {
        Ok(self
            .store
            .list_orders_created_before(OrderStatus::Created, cutoff)
            .await?)
    }

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))
    }

    async fn load_for_user(&self, order_id: OrderId, user_id: UserId) -> Result<Order> {
        let order = self.load(order_id).await?;
        if order.user_id() != user_id {
            return Err(ServiceError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    /// Releases the reservations behind the given lines, logging instead of
    /// failing: a line whose release errors leaves stock reserved for an
    /// operator to reconcile, which beats double-releasing on a retry.
    async fn release_lines(&self, lines: &[OrderLine]) {
        for line in lines {
            if let Err(e) = self.inventory.release(&line.product_id, line.quantity).await {
                tracing::error!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %e,
                    "failed to release reserved stock"
                );
            }
        }
    }
}
