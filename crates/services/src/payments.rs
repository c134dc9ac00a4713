//! Payment service: the idempotency gate in front of asynchronous
//! settlement.

use std::sync::Arc;

use common::{Clock, IdempotencyKey, OrderId, PaymentId, UserId};
use domain::{DomainError, OrderStatus, Payment};
use store::{PaymentStore, StoreError};

use crate::error::{Result, ServiceError};
use crate::orchestrator::SettlementQueue;
use crate::orders::OrderService;

/// Collapses duplicate payment attempts onto one record and hands accepted
/// ones to the settlement worker.
///
/// The gate is the storage uniqueness constraint on
/// `(user_id, idempotency_key)`, not a lock: the insert is attempted
/// first, and a conflict means a concurrent identical request won — the
/// winner's row is re-read and returned. A check-then-insert alone would
/// race; the constraint also makes the guarantee hold across processes.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    orders: OrderService,
    settlement: SettlementQueue,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        orders: OrderService,
        settlement: SettlementQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            orders,
            settlement,
            clock,
        }
    }

    /// Accepts one logical payment attempt.
    ///
    /// Replays return the existing record unchanged — no new side effects,
    /// even while the first attempt is still `Requested`. The returned
    /// payment is `Requested`; the caller observes the terminal outcome by
    /// polling, once the settlement worker has run.
    #[tracing::instrument(skip(self))]
    pub async fn process(
        &self,
        user_id: UserId,
        order_id: OrderId,
        key: IdempotencyKey,
    ) -> Result<Payment> {
        if key.is_empty() {
            return Err(ServiceError::Validation(
                "idempotency key must not be empty".to_string(),
            ));
        }

        if let Some(existing) = self.store.find_payment_by_key(user_id, &key).await? {
            return check_replay(existing, order_id, &key);
        }

        let order = self.orders.get_by_id_for_user(order_id, user_id).await?;
        if order.status() != OrderStatus::Created {
            return Err(DomainError::InvalidOrderStatus {
                current: order.status(),
                required: OrderStatus::Created,
                action: "process payment",
            }
            .into());
        }

        let payment = Payment::new(
            user_id,
            order_id,
            key.clone(),
            order.total_amount(),
            self.clock.now(),
        );
        match self.store.insert_payment(&payment).await {
            Ok(()) => {
                metrics::counter!("payments_requested_total").increment(1);
                tracing::info!(
                    payment_id = %payment.id(),
                    %order_id,
                    amount = %payment.amount(),
                    "payment accepted, handing to settlement"
                );
                // The row is committed; only now may settlement act on it.
                self.settlement.enqueue(payment.id());
                Ok(payment)
            }
            Err(StoreError::DuplicateKey { .. }) => {
                // A concurrent request with the same key won the insert
                // race; return its record instead.
                match self.store.find_payment_by_key(user_id, &key).await? {
                    Some(winner) => check_replay(winner, order_id, &key),
                    None => Err(ServiceError::Integrity(format!(
                        "no payment found for key {key} after a uniqueness violation"
                    ))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Loads a payment without an ownership check, for internal flows.
    pub async fn get_by_id(&self, payment_id: PaymentId) -> Result<Payment> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or(ServiceError::PaymentNotFound(payment_id))
    }

    /// Loads a payment scoped to its owner.
    pub async fn get_by_id_for_user(
        &self,
        payment_id: PaymentId,
        user_id: UserId,
    ) -> Result<Payment> {
        let payment = self.get_by_id(payment_id).await?;
        if payment.user_id() != user_id {
            return Err(ServiceError::PaymentNotFound(payment_id));
        }
        Ok(payment)
    }

    /// All payments of one user, oldest first.
    pub async fn list_by_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        Ok(self.store.list_payments_by_user(user_id).await?)
    }
}

fn check_replay(existing: Payment, order_id: OrderId, key: &IdempotencyKey) -> Result<Payment> {
    if existing.order_id() != order_id {
        return Err(ServiceError::DuplicatePayment { key: key.clone() });
    }
    Ok(existing)
}
