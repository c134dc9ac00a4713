//! Refund record with the admin approval state machine.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderLineId, PaymentId, RefundId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{Money, ProductId};

/// Status of a refund request.
///
/// ```text
/// Requested ──┬──► Approved ──┬──► Completed
///             │               └──► Failed
///             └──► Rejected
/// ```
///
/// Quantities in `Requested`, `Approved` and `Completed` refunds count
/// against the per-line ledger; `Rejected` and `Failed` ones do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Requested,
    Approved,
    Rejected,
    Completed,
    Failed,
}

impl RefundStatus {
    /// Returns true if the refund still holds quantity in the ledger.
    pub fn counts_against_ledger(&self) -> bool {
        matches!(
            self,
            RefundStatus::Requested | RefundStatus::Approved | RefundStatus::Completed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RefundStatus::Requested => "REQUESTED",
            RefundStatus::Approved => "APPROVED",
            RefundStatus::Rejected => "REJECTED",
            RefundStatus::Completed => "COMPLETED",
            RefundStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RefundStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "REQUESTED" => Ok(RefundStatus::Requested),
            "APPROVED" => Ok(RefundStatus::Approved),
            "REJECTED" => Ok(RefundStatus::Rejected),
            "COMPLETED" => Ok(RefundStatus::Completed),
            "FAILED" => Ok(RefundStatus::Failed),
            other => Err(format!("unknown refund status: {other}")),
        }
    }
}

/// One refunded line, snapshotted from the matching order line at request
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLine {
    pub order_line_id: OrderLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl RefundLine {
    pub fn new(
        order_line_id: OrderLineId,
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            order_line_id,
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
        }
    }

    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Refund aggregate root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    id: RefundId,
    user_id: UserId,
    payment_id: PaymentId,
    order_id: OrderId,
    status: RefundStatus,
    amount: Money,
    reason: String,
    admin_comment: Option<String>,
    lines: Vec<RefundLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Refund {
    /// Creates a `Requested` refund; `amount` is the sum of line subtotals.
    pub fn new(
        user_id: UserId,
        payment_id: PaymentId,
        order_id: OrderId,
        lines: Vec<RefundLine>,
        reason: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let amount = lines.iter().map(RefundLine::subtotal).sum();
        Self {
            id: RefundId::new(),
            user_id,
            payment_id,
            order_id,
            status: RefundStatus::Requested,
            amount,
            reason: reason.into(),
            admin_comment: None,
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a refund from persisted fields.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: RefundId,
        user_id: UserId,
        payment_id: PaymentId,
        order_id: OrderId,
        status: RefundStatus,
        amount: Money,
        reason: String,
        admin_comment: Option<String>,
        lines: Vec<RefundLine>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            payment_id,
            order_id,
            status,
            amount,
            reason,
            admin_comment,
            lines,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> RefundId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn payment_id(&self) -> PaymentId {
        self.payment_id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn status(&self) -> RefundStatus {
        self.status
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn admin_comment(&self) -> Option<&str> {
        self.admin_comment.as_deref()
    }

    pub fn lines(&self) -> &[RefundLine] {
        &self.lines
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Admin approval; the refund then awaits external settlement.
    pub fn approve(
        &mut self,
        comment: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.guard(RefundStatus::Requested, "approve")?;
        self.status = RefundStatus::Approved;
        self.admin_comment = Some(comment.into());
        self.updated_at = now;
        Ok(())
    }

    /// Admin rejection; terminal, no side effects elsewhere.
    pub fn reject(
        &mut self,
        comment: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.guard(RefundStatus::Requested, "reject")?;
        self.status = RefundStatus::Rejected;
        self.admin_comment = Some(comment.into());
        self.updated_at = now;
        Ok(())
    }

    /// External settlement succeeded.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.guard(RefundStatus::Approved, "complete")?;
        self.status = RefundStatus::Completed;
        self.updated_at = now;
        Ok(())
    }

    /// External settlement failed; the quantity leaves the ledger.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.guard(RefundStatus::Approved, "fail")?;
        self.status = RefundStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    fn guard(&self, required: RefundStatus, action: &'static str) -> Result<(), DomainError> {
        if self.status != required {
            return Err(DomainError::InvalidRefundStatus {
                current: self.status,
                action,
            });
        }
        Ok(())
    }
}
