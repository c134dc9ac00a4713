//! Payment record and its single-shot terminal transition.

use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId, PaymentId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::Money;

/// Settlement status of a payment.
///
/// `Requested` moves exactly once to `Completed` or `Failed`; both are
/// terminal. The guard on that transition is what makes the success/failure
/// side effects single-shot even when the settlement worker and a retried
/// request race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Requested,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Requested => "REQUESTED",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(PaymentStatus::Requested),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// One logical payment attempt.
///
/// `(user_id, idempotency_key)` is unique system-wide, enforced at the
/// storage layer so that concurrent duplicate requests collapse onto exactly
/// one record. `amount` is a snapshot of the order total at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    id: PaymentId,
    user_id: UserId,
    order_id: OrderId,
    idempotency_key: IdempotencyKey,
    status: PaymentStatus,
    amount: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a `Requested` payment snapshotting the order total.
    pub fn new(
        user_id: UserId,
        order_id: OrderId,
        idempotency_key: IdempotencyKey,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            user_id,
            order_id,
            idempotency_key,
            status: PaymentStatus::Requested,
            amount,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a payment from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: PaymentId,
        user_id: UserId,
        order_id: OrderId,
        idempotency_key: IdempotencyKey,
        status: PaymentStatus,
        amount: Money,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            order_id,
            idempotency_key,
            status,
            amount,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> PaymentId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn idempotency_key(&self) -> &IdempotencyKey {
        &self.idempotency_key
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Marks the payment settled.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Completed, "complete", now)
    }

    /// Marks the payment failed.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(PaymentStatus::Failed, "fail", now)
    }

    fn transition(
        &mut self,
        next: PaymentStatus,
        action: &'static str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != PaymentStatus::Requested {
            return Err(DomainError::InvalidPaymentStatus {
                current: self.status,
                action,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}
