//! Fulfillment core for the order system.
//!
//! Five services cooperate over the shared storage backend:
//! - [`InventoryLedger`] — per-product counters under exclusive row locks
//! - [`OrderService`] — order lifecycle, snapshotting and reservation
//! - [`PaymentService`] — the idempotency gate in front of settlement
//! - [`Orchestrator`] — asynchronous settlement and its compensations
//! - [`RefundService`] — the per-line refund ledger and admin approval flow
//!
//! plus the [`ExpirationSweeper`] background task that reclaims abandoned
//! reservations. External collaborators ([`Catalog`],
//! [`SettlementGateway`], `Clock`) are traits; tests substitute
//! controllable stubs.

pub mod catalog;
pub mod error;
pub mod gateway;
pub mod inventory;
pub mod orchestrator;
pub mod orders;
pub mod payments;
pub mod refunds;
pub mod sweeper;

use std::sync::Arc;

use common::Clock;
use store::Backend;

pub use catalog::{Catalog, InMemoryCatalog, ProductInfo};
pub use error::{Result, ServiceError};
pub use gateway::{GatewayError, SettlementGateway, StubGateway};
pub use inventory::InventoryLedger;
pub use orchestrator::{Orchestrator, SettlementQueue, SettlementWorker};
pub use orders::{OrderLineRequest, OrderService};
pub use payments::PaymentService;
pub use refunds::{RefundLineRequest, RefundService};
pub use sweeper::ExpirationSweeper;

/// The wired service set over one storage backend.
///
/// All handles are cheap clones sharing the same stores and row locks, so
/// the settlement worker, the sweeper and request handlers always contend
/// on the same mutexes.
#[derive(Clone)]
pub struct Services {
    pub inventory: InventoryLedger,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub refunds: RefundService,
    pub orchestrator: Orchestrator,
}

impl Services {
    /// Wires the full service set.
    ///
    /// Returns the [`SettlementWorker`] alongside; the caller decides
    /// whether to spawn its run loop (production) or drain it manually
    /// (tests).
    pub fn new(
        backend: Backend,
        catalog: Arc<dyn Catalog>,
        gateway: Arc<dyn SettlementGateway>,
        clock: Arc<dyn Clock>,
    ) -> (Self, SettlementWorker) {
        let inventory = InventoryLedger::new(backend.inventory, Arc::clone(&clock));
        let orders = OrderService::new(
            backend.orders,
            inventory.clone(),
            catalog,
            Arc::clone(&clock),
        );
        let orchestrator = Orchestrator::new(
            Arc::clone(&backend.payments),
            orders.clone(),
            inventory.clone(),
            Arc::clone(&gateway),
            Arc::clone(&clock),
        );
        let (queue, worker) = SettlementWorker::channel(orchestrator.clone());
        let payments = PaymentService::new(backend.payments, orders.clone(), queue, Arc::clone(&clock));
        let refunds = RefundService::new(
            backend.refunds,
            payments.clone(),
            orders.clone(),
            inventory.clone(),
            gateway,
            clock,
        );

        (
            Self {
                inventory,
                orders,
                payments,
                refunds,
                orchestrator,
            },
            worker,
        )
    }
}
