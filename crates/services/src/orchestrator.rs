//! Settlement orchestration: the in-process queue handoff, the gateway
//! call, and the compensations around it.

use std::sync::Arc;
use std::time::Instant;

use common::{Clock, PaymentId};
use domain::Payment;
use store::PaymentStore;
use tokio::sync::mpsc;

use crate::gateway::SettlementGateway;
use crate::inventory::InventoryLedger;
use crate::orders::OrderService;

/// Sending half of the settlement handoff.
///
/// Enqueueing happens strictly after the payment row is committed, so the
/// worker never acts on state that could still disappear. This is
/// fire-and-continue, not fire-and-forget: a dead worker is logged loudly,
/// but there is no retry — the payment stays `Requested` for an operator.
#[derive(Clone)]
pub struct SettlementQueue {
    tx: mpsc::UnboundedSender<PaymentId>,
}

impl SettlementQueue {
    /// Hands a committed payment to the settlement worker.
    pub fn enqueue(&self, payment_id: PaymentId) {
        if self.tx.send(payment_id).is_err() {
            tracing::error!(%payment_id, "settlement worker is gone; payment left REQUESTED");
        }
    }
}

/// Drives payment settlement and its compensations.
///
/// Nothing here propagates errors to a caller: every step logs its own
/// failure with payment and order context and the aggregates are left in
/// their last consistent state. There is deliberately no automatic retry.
#[derive(Clone)]
pub struct Orchestrator {
    payments: Arc<dyn PaymentStore>,
    orders: OrderService,
    inventory: InventoryLedger,
    gateway: Arc<dyn SettlementGateway>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        orders: OrderService,
        inventory: InventoryLedger,
        gateway: Arc<dyn SettlementGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            payments,
            orders,
            inventory,
            gateway,
            clock,
        }
    }

    /// Settles one payment end to end.
    ///
    /// The gateway call happens without any entity lock held. Exactly one
    /// of the two branches runs, decided by the gateway outcome: success
    /// completes the payment and marks the order paid; failure fails the
    /// payment and releases every reserved line.
    #[tracing::instrument(skip(self))]
    pub async fn settle(&self, payment_id: PaymentId) {
        let payment = match self.payments.find_payment(payment_id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::error!(%payment_id, "payment vanished before settlement");
                return;
            }
            Err(e) => {
                tracing::error!(%payment_id, error = %e, "failed to load payment for settlement");
                return;
            }
        };
        if payment.status().is_terminal() {
            tracing::warn!(%payment_id, status = %payment.status(), "payment already settled, skipping");
            return;
        }

        let start = Instant::now();
        match self.gateway.settle_payment(&payment).await {
            Ok(()) => self.on_success(payment).await,
            Err(e) => {
                tracing::warn!(
                    %payment_id,
                    order_id = %payment.order_id(),
                    error = %e,
                    "payment settlement failed, compensating"
                );
                self.on_failure(payment).await;
            }
        }
        metrics::histogram!("settlement_duration_seconds").record(start.elapsed().as_secs_f64());
    }

    async fn on_success(&self, mut payment: Payment) {
        let payment_id = payment.id();
        let order_id = payment.order_id();

        // The terminal transition is the at-most-once guard for the order
        // side effect.
        if let Err(e) = payment.mark_completed(self.clock.now()) {
            tracing::error!(%payment_id, error = %e, "cannot complete payment");
            return;
        }
        if let Err(e) = self.payments.save_payment(&payment).await {
            tracing::error!(%payment_id, %order_id, error = %e, "failed to persist completed payment");
            return;
        }
        metrics::counter!("payments_completed_total").increment(1);

        if let Err(e) = self.orders.mark_paid(order_id).await {
            tracing::error!(
                %payment_id,
                %order_id,
                error = %e,
                "payment completed but order update failed; manual reconciliation needed"
            );
            return;
        }
        tracing::info!(%payment_id, %order_id, "payment settled");
    }

    async fn on_failure(&self, mut payment: Payment) {
        let payment_id = payment.id();
        let order_id = payment.order_id();

        if let Err(e) = payment.mark_failed(self.clock.now()) {
            // Terminal guard tripped: another path already resolved this
            // payment, so the compensation must not run again.
            tracing::error!(%payment_id, error = %e, "cannot fail payment, skipping compensation");
            return;
        }
        if let Err(e) = self.payments.save_payment(&payment).await {
            tracing::error!(%payment_id, %order_id, error = %e, "failed to persist failed payment");
        }
        metrics::counter!("payments_failed_total").increment(1);

        // Compensating action: the order stays CREATED, its reservations go
        // back to the available pool.
        let order = match self.orders.get_by_id(order_id).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(%payment_id, %order_id, error = %e, "cannot load order for compensation");
                return;
            }
        };
        for line in order.lines() {
            if let Err(e) = self.inventory.release(&line.product_id, line.quantity).await {
                tracing::error!(
                    %order_id,
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %e,
                    "failed to release reserved stock"
                );
            }
        }
        tracing::info!(%payment_id, %order_id, "released reservations after failed settlement");
    }
}

/// Receiving half of the settlement handoff.
pub struct SettlementWorker {
    rx: mpsc::UnboundedReceiver<PaymentId>,
    orchestrator: Orchestrator,
}

impl SettlementWorker {
    /// Builds the queue/worker pair around an orchestrator.
    pub fn channel(orchestrator: Orchestrator) -> (SettlementQueue, SettlementWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SettlementQueue { tx }, SettlementWorker { rx, orchestrator })
    }

    /// Runs until every queue handle is dropped. Spawn this once at
    /// startup.
    pub async fn run(mut self) {
        while let Some(payment_id) = self.rx.recv().await {
            self.orchestrator.settle(payment_id).await;
        }
        tracing::info!("settlement queue closed, worker exiting");
    }

    /// Settles everything currently queued and returns how many payments
    /// were processed. Lets tests drive settlement deterministically
    /// instead of racing the run loop.
    pub async fn drain(&mut self) -> usize {
        let mut settled = 0;
        while let Ok(payment_id) = self.rx.try_recv() {
            self.orchestrator.settle(payment_id).await;
            settled += 1;
        }
        settled
    }
}
