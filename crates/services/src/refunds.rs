//! Refund service: the per-line refund ledger and the admin approval flow.

use std::collections::HashMap;
use std::sync::Arc;

use common::{Clock, OrderLineId, PaymentId, RefundId, UserId};
use domain::{Money, OrderStatus, Refund, RefundLine, RefundStatus};
use store::{KeyedMutex, RefundStore};

use crate::error::{Result, ServiceError};
use crate::gateway::SettlementGateway;
use crate::inventory::InventoryLedger;
use crate::orders::OrderService;
use crate::payments::PaymentService;

/// One requested line of a refund.
#[derive(Debug, Clone)]
pub struct RefundLineRequest {
    pub order_line_id: OrderLineId,
    pub quantity: u32,
}

/// Accepts, approves and reconciles refunds against the per-line ledger.
///
/// The ledger is recomputed from persisted refund rows on every request —
/// the sum of quantities across refunds still holding quantity
/// (`REQUESTED`, `APPROVED`, `COMPLETED`) must never exceed the original
/// line quantity. Ledger validation and completion serialize per payment
/// through a keyed mutex, so two concurrent requests cannot both validate
/// against the same stale totals. The gateway call stays outside that
/// lock.
#[derive(Clone)]
pub struct RefundService {
    store: Arc<dyn RefundStore>,
    payments: PaymentService,
    orders: OrderService,
    inventory: InventoryLedger,
    gateway: Arc<dyn SettlementGateway>,
    locks: Arc<KeyedMutex<PaymentId>>,
    clock: Arc<dyn Clock>,
}

impl RefundService {
    pub fn new(
        store: Arc<dyn RefundStore>,
        payments: PaymentService,
        orders: OrderService,
        inventory: InventoryLedger,
        gateway: Arc<dyn SettlementGateway>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            payments,
            orders,
            inventory,
            gateway,
            locks: Arc::new(KeyedMutex::new()),
            clock,
        }
    }

    /// Accepts a refund request, leaving it `Requested` for admin review.
    ///
    /// The first request against a `Paid` order moves it to
    /// `RefundRequested`; later partial requests find it there already.
    /// Validation runs before that transition, so a rejected request leaves
    /// the order untouched.
    #[tracing::instrument(skip(self))]
    pub async fn process(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        lines: Vec<RefundLineRequest>,
        reason: String,
    ) -> Result<Refund> {
        if lines.is_empty() {
            return Err(ServiceError::Validation(
                "refund must reference at least one order line".to_string(),
            ));
        }
        for line in &lines {
            if line.quantity == 0 {
                return Err(ServiceError::Validation(
                    "refund quantity must be positive".to_string(),
                ));
            }
        }

        let payment = self.payments.get_by_id_for_user(payment_id, user_id).await?;

        let _guard = self.locks.acquire(payment_id).await;

        let order = self.orders.get_by_id(payment.order_id()).await?;
        match order.status() {
            OrderStatus::Paid | OrderStatus::RefundRequested => {}
            other => {
                return Err(ServiceError::RefundNotAllowed(format!(
                    "order {} is {other}, refunds need PAID or REFUND_REQUESTED",
                    order.id()
                )));
            }
        }

        let mut consumed = self.consumed_per_line(payment_id).await?;
        let mut snapshots = Vec::with_capacity(lines.len());
        for request in &lines {
            let line = order
                .line(request.order_line_id)
                .ok_or(ServiceError::OrderItemNotFound(request.order_line_id))?;

            let already = consumed.get(&request.order_line_id).copied().unwrap_or(0);
            if already + request.quantity > line.quantity {
                return Err(ServiceError::RefundQuantityExceeded {
                    order_line_id: request.order_line_id,
                    already,
                    requested: request.quantity,
                    original: line.quantity,
                });
            }
            // Count this request's own lines too, in case it references the
            // same order line twice.
            *consumed.entry(request.order_line_id).or_default() += request.quantity;

            snapshots.push(RefundLine::new(
                line.id,
                line.product_id.clone(),
                line.product_name.clone(),
                line.unit_price,
                request.quantity,
            ));
        }

        if order.status() == OrderStatus::Paid {
            self.orders.request_refund(order.id()).await?;
        }

        let refund = Refund::new(
            user_id,
            payment_id,
            order.id(),
            snapshots,
            reason,
            self.clock.now(),
        );
        self.store.insert_refund(&refund).await?;

        metrics::counter!("refunds_requested_total").increment(1);
        tracing::info!(
            refund_id = %refund.id(),
            %payment_id,
            amount = %refund.amount(),
            "refund requested"
        );
        Ok(refund)
    }

    /// Approves a refund and runs external settlement.
    ///
    /// On settlement failure the refund ends `Failed` and nothing else
    /// changes — its quantities leave the ledger. On success it ends
    /// `Completed`, the refunded stock is released, and if the completed
    /// refunds now cover the whole payment the order becomes `Refunded`;
    /// otherwise it stays `RefundRequested` (partial refund).
    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, refund_id: RefundId, comment: String) -> Result<Refund> {
        let mut refund = self.get_by_id(refund_id).await?;
        refund.approve(comment, self.clock.now())?;
        self.store.save_refund(&refund).await?;

        // Gateway settlement happens with no locks held.
        if let Err(e) = self.gateway.settle_refund(&refund).await {
            tracing::warn!(%refund_id, error = %e, "refund settlement failed");
            refund.mark_failed(self.clock.now())?;
            self.store.save_refund(&refund).await?;
            metrics::counter!("refunds_failed_total").increment(1);
            return Ok(refund);
        }

        let _guard = self.locks.acquire(refund.payment_id()).await;
        refund.mark_completed(self.clock.now())?;
        self.store.save_refund(&refund).await?;
        metrics::counter!("refunds_completed_total").increment(1);
        tracing::info!(%refund_id, amount = %refund.amount(), "refund completed");

        self.reconcile(&refund).await;
        Ok(refund)
    }

    /// Rejects a refund; terminal, no inventory or order side effects.
    #[tracing::instrument(skip(self))]
    pub async fn reject(&self, refund_id: RefundId, comment: String) -> Result<Refund> {
        let mut refund = self.get_by_id(refund_id).await?;
        refund.reject(comment, self.clock.now())?;
        self.store.save_refund(&refund).await?;

        tracing::info!(%refund_id, "refund rejected");
        Ok(refund)
    }

    /// Loads a refund without an ownership check, for admin flows.
    pub async fn get_by_id(&self, refund_id: RefundId) -> Result<Refund> {
        self.store
            .find_refund(refund_id)
            .await?
            .ok_or(ServiceError::RefundNotFound(refund_id))
    }

    /// Loads a refund scoped to its owner.
    pub async fn get_by_id_for_user(
        &self,
        refund_id: RefundId,
        user_id: UserId,
    ) -> Result<Refund> {
        let refund = self.get_by_id(refund_id).await?;
        if refund.user_id() != user_id {
            return Err(ServiceError::RefundNotFound(refund_id));
        }
        Ok(refund)
    }

    /// All refunds of one user, oldest first.
    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Refund>> {
        Ok(self.store.list_refunds_by_user(user_id).await?)
    }

    /// Admin queue view.
    pub async fn list_by_status(&self, status: RefundStatus) -> Result<Vec<Refund>> {
        Ok(self.store.list_refunds_by_status(status).await?)
    }

    /// Quantity already consumed per order line by refunds that still hold
    /// quantity in the ledger.
    async fn consumed_per_line(&self, payment_id: PaymentId) -> Result<HashMap<OrderLineId, u32>> {
        let refunds = self.store.list_refunds_by_payment(payment_id).await?;
        let mut consumed: HashMap<OrderLineId, u32> = HashMap::new();
        for refund in refunds
            .iter()
            .filter(|r| r.status().counts_against_ledger())
        {
            for line in refund.lines() {
                *consumed.entry(line.order_line_id).or_default() += line.quantity;
            }
        }
        Ok(consumed)
    }

    /// Post-completion reconciliation: restore stock and, on full refund,
    /// finish the order. Failures here are logged for manual reconciliation
    /// — the refund itself is already `Completed`.
    async fn reconcile(&self, refund: &Refund) {
        for line in refund.lines() {
            if let Err(e) = self.inventory.release(&line.product_id, line.quantity).await {
                tracing::error!(
                    refund_id = %refund.id(),
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %e,
                    "failed to restore stock for refunded line"
                );
            }
        }

        let completed_total = match self.store.list_refunds_by_payment(refund.payment_id()).await {
            Ok(refunds) => refunds
                .iter()
                .filter(|r| r.status() == RefundStatus::Completed)
                .map(Refund::amount)
                .sum::<Money>(),
            Err(e) => {
                tracing::error!(
                    refund_id = %refund.id(),
                    payment_id = %refund.payment_id(),
                    error = %e,
                    "failed to total completed refunds"
                );
                return;
            }
        };
        let payment = match self.payments.get_by_id(refund.payment_id()).await {
            Ok(payment) => payment,
            Err(e) => {
                tracing::error!(
                    refund_id = %refund.id(),
                    payment_id = %refund.payment_id(),
                    error = %e,
                    "failed to load payment for reconciliation"
                );
                return;
            }
        };

        if completed_total == payment.amount() {
            match self.orders.mark_refunded(refund.order_id()).await {
                Ok(_) => {
                    tracing::info!(order_id = %refund.order_id(), "order fully refunded")
                }
                Err(e) => tracing::error!(
                    order_id = %refund.order_id(),
                    error = %e,
                    "full refund reached but order update failed"
                ),
            }
        }
    }
}
