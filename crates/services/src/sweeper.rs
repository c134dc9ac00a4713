//! Background sweep that expires stale unpaid orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use common::Clock;

use crate::orders::OrderService;

/// Periodically reclaims reservations held by abandoned orders.
///
/// Each pass queries `CREATED` orders older than the timeout and expires
/// them one by one. An order that a concurrent payment or cancellation
/// already resolved is skipped silently; an order that fails is logged and
/// the batch continues — one bad order never aborts a sweep. There is no
/// retry beyond the next scheduled pass.
pub struct ExpirationSweeper {
    orders: OrderService,
    clock: Arc<dyn Clock>,
    timeout: ChronoDuration,
    interval: Duration,
}

impl ExpirationSweeper {
    pub fn new(
        orders: OrderService,
        clock: Arc<dyn Clock>,
        timeout: ChronoDuration,
        interval: Duration,
    ) -> Self {
        Self {
            orders,
            clock,
            timeout,
            interval,
        }
    }

    /// Runs a single sweep pass and returns how many orders were expired.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> usize {
        let cutoff = self.clock.now() - self.timeout;
        let candidates = match self.orders.expired_candidates(cutoff).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!(error = %e, "failed to query stale orders");
                return 0;
            }
        };

        let mut expired = 0;
        for order_id in candidates {
            match self.orders.expire(order_id).await {
                Ok(true) => expired += 1,
                Ok(false) => {
                    tracing::debug!(%order_id, "order already resolved, skipping");
                }
                Err(e) => {
                    tracing::warn!(%order_id, error = %e, "failed to expire order");
                }
            }
        }

        if expired > 0 {
            tracing::info!(expired, "expiration sweep reclaimed stale orders");
        }
        expired
    }

    /// Runs forever on the configured interval. Spawn this once at
    /// startup.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{FixedClock, UserId};
    use domain::{Money, OrderStatus, ProductId};
    use store::{Backend, MemoryStore};

    use crate::catalog::InMemoryCatalog;
    use crate::inventory::InventoryLedger;
    use crate::orders::{OrderLineRequest, OrderService};

    use super::*;

    async fn setup(clock: Arc<FixedClock>) -> (ExpirationSweeper, OrderService, InventoryLedger) {
        let store = MemoryStore::new();
        let backend = Backend {
            inventory: Arc::new(store.clone()),
            orders: Arc::new(store.clone()),
            payments: Arc::new(store.clone()),
            refunds: Arc::new(store),
        };
        let clock: Arc<dyn Clock> = clock;
        let inventory = InventoryLedger::new(backend.inventory, Arc::clone(&clock));
        let catalog = InMemoryCatalog::new();

        let product = ProductId::new("SKU-001");
        catalog.put(product.clone(), "Widget", Money::from_cents(1000));
        inventory.initialize(product.clone()).await.unwrap();
        inventory.add_stock(&product, 10).await.unwrap();

        let orders = OrderService::new(
            backend.orders,
            inventory.clone(),
            Arc::new(catalog),
            Arc::clone(&clock),
        );
        let sweeper = ExpirationSweeper::new(
            orders.clone(),
            clock,
            ChronoDuration::minutes(30),
            Duration::from_secs(60),
        );
        (sweeper, orders, inventory)
    }

    fn one_line(quantity: u32) -> Vec<OrderLineRequest> {
        vec![OrderLineRequest {
            product_id: ProductId::new("SKU-001"),
            quantity,
        }]
    }

    #[tokio::test]
    async fn stale_orders_expire_and_release_stock() {
        let clock = Arc::new(FixedClock::at(chrono::Utc::now()));
        let (sweeper, orders, inventory) = setup(Arc::clone(&clock)).await;

        let order = orders.create(UserId::new(), one_line(4)).await.unwrap();

        // Young orders survive a pass.
        assert_eq!(sweeper.run_once().await, 0);

        clock.advance(ChronoDuration::minutes(31));
        assert_eq!(sweeper.run_once().await, 1);

        let reloaded = orders.get_by_id(order.id()).await.unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Expired);
        let record = inventory
            .get_by_product(&ProductId::new("SKU-001"))
            .await
            .unwrap();
        assert_eq!((record.available(), record.reserved()), (10, 0));
    }

    #[tokio::test]
    async fn resolved_orders_are_skipped() {
        let clock = Arc::new(FixedClock::at(chrono::Utc::now()));
        let (sweeper, orders, inventory) = setup(Arc::clone(&clock)).await;

        let order = orders.create(UserId::new(), one_line(4)).await.unwrap();
        clock.advance(ChronoDuration::minutes(31));
        orders.mark_paid(order.id()).await.unwrap();

        assert_eq!(sweeper.run_once().await, 0);

        let reloaded = orders.get_by_id(order.id()).await.unwrap();
        assert_eq!(reloaded.status(), OrderStatus::Paid);
        let record = inventory
            .get_by_product(&ProductId::new("SKU-001"))
            .await
            .unwrap();
        assert_eq!(record.reserved(), 4);
    }

    #[tokio::test]
    async fn one_bad_order_does_not_abort_the_batch() {
        let clock = Arc::new(FixedClock::at(chrono::Utc::now()));
        let (sweeper, orders, _) = setup(Arc::clone(&clock)).await;

        let first = orders.create(UserId::new(), one_line(2)).await.unwrap();
        let second = orders.create(UserId::new(), one_line(2)).await.unwrap();

        clock.advance(ChronoDuration::minutes(31));
        // Both stale; both must be handled even though the sweep processes
        // them sequentially.
        assert_eq!(sweeper.run_once().await, 2);

        for id in [first.id(), second.id()] {
            assert_eq!(
                orders.get_by_id(id).await.unwrap().status(),
                OrderStatus::Expired
            );
        }
    }
}
