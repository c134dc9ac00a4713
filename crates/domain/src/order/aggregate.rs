//! Order aggregate.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderLineId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::{Money, ProductId};

use super::OrderStatus;

/// One line of an order.
///
/// All fields besides the ids are a point-in-time snapshot of the catalog at
/// order creation and never change, regardless of later catalog updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub product_id: ProductId,
    pub product_name: String,
    pub unit_price: Money,
    pub quantity: u32,
}

impl OrderLine {
    /// Creates a line from catalog snapshot data.
    pub fn new(
        product_id: ProductId,
        product_name: impl Into<String>,
        unit_price: Money,
        quantity: u32,
    ) -> Self {
        Self {
            id: OrderLineId::new(),
            product_id,
            product_name: product_name.into(),
            unit_price,
            quantity,
        }
    }

    /// The line total (unit price × quantity).
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// Order aggregate root.
///
/// The header carries the guarded status machine; the lines are immutable
/// snapshots. Orders are never deleted — terminal statuses end the
/// lifecycle. Status mutations require the caller to hold the per-order row
/// lock, since the settlement worker, the expiration sweep and a live user
/// request can all touch the same order concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    total_amount: Money,
    lines: Vec<OrderLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates an order in `Created` with the given snapshot lines.
    ///
    /// `total_amount` is computed once here and is immutable afterwards.
    pub fn create(user_id: UserId, lines: Vec<OrderLine>, now: DateTime<Utc>) -> Self {
        let total_amount = lines.iter().map(OrderLine::subtotal).sum();
        Self {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Created,
            total_amount,
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds an order from persisted fields.
    pub fn from_parts(
        id: OrderId,
        user_id: UserId,
        status: OrderStatus,
        total_amount: Money,
        lines: Vec<OrderLine>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            status,
            total_amount,
            lines,
            created_at,
            updated_at,
        }
    }

    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the line with the given id, if it belongs to this order.
    pub fn line(&self, line_id: OrderLineId) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Cancels the order before payment.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Created, OrderStatus::Canceled, "cancel", now)
    }

    /// Marks the order paid after payment settlement succeeds.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Created, OrderStatus::Paid, "mark paid", now)
    }

    /// Completes the order on fulfillment.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Paid, OrderStatus::Completed, "complete", now)
    }

    /// Expires an unpaid order.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(OrderStatus::Created, OrderStatus::Expired, "expire", now)
    }

    /// Opens the refund flow on a paid order.
    ///
    /// Later partial refunds re-enter the already `RefundRequested` order
    /// through the refund ledger, not through this method.
    pub fn request_refund(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(
            OrderStatus::Paid,
            OrderStatus::RefundRequested,
            "request refund",
            now,
        )
    }

    /// Marks the order fully refunded.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition(
            OrderStatus::RefundRequested,
            OrderStatus::Refunded,
            "mark refunded",
            now,
        )
    }

    fn transition(
        &mut self,
        required: OrderStatus,
        next: OrderStatus,
        action: &'static str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status != required {
            return Err(DomainError::InvalidOrderStatus {
                current: self.status,
                required,
                action,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        let lines = vec![
            OrderLine::new(ProductId::new("SKU-001"), "Widget", Money::from_cents(1000), 2),
            OrderLine::new(ProductId::new("SKU-002"), "Gadget", Money::from_cents(500), 1),
        ];
        Order::create(UserId::new(), lines, Utc::now())
    }

    #[test]
    fn create_computes_total_once() {
        let order = order();
        assert_eq!(order.status(), OrderStatus::Created);
        assert_eq!(order.total_amount().cents(), 2500);
        assert_eq!(order.lines().len(), 2);
    }

    #[test]
    fn line_lookup_by_id() {
        let order = order();
        let first = &order.lines()[0];
        assert_eq!(order.line(first.id), Some(first));
        assert_eq!(order.line(OrderLineId::new()), None);
    }

    #[test]
    fn line_subtotal() {
        let line = OrderLine::new(ProductId::new("SKU-001"), "Widget", Money::from_cents(1000), 5);
        assert_eq!(line.subtotal().cents(), 5000);
    }

    #[test]
    fn paid_path() {
        let mut order = order();
        order.mark_paid(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);

        order.complete(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Completed);
        assert!(order.status().is_terminal());
    }

    #[test]
    fn refund_path() {
        let mut order = order();
        order.mark_paid(Utc::now()).unwrap();
        order.request_refund(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::RefundRequested);

        order.mark_refunded(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Refunded);
    }

    #[test]
    fn cancel_only_from_created() {
        let mut order = order();
        order.mark_paid(Utc::now()).unwrap();

        let err = order.cancel(Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidOrderStatus {
                current: OrderStatus::Paid,
                required: OrderStatus::Created,
                action: "cancel",
            }
        );
    }

    #[test]
    fn expire_only_from_created() {
        let mut order = order();
        order.expire(Utc::now()).unwrap();
        assert_eq!(order.status(), OrderStatus::Expired);

        let mut paid = self::order();
        paid.mark_paid(Utc::now()).unwrap();
        assert!(paid.expire(Utc::now()).is_err());
    }

    #[test]
    fn terminal_statuses_reject_all_transitions() {
        let mut order = order();
        order.cancel(Utc::now()).unwrap();

        assert!(order.mark_paid(Utc::now()).is_err());
        assert!(order.complete(Utc::now()).is_err());
        assert!(order.expire(Utc::now()).is_err());
        assert!(order.request_refund(Utc::now()).is_err());
        assert!(order.mark_refunded(Utc::now()).is_err());
    }

    #[test]
    fn complete_requires_paid() {
        let mut order = order();
        let err = order.complete(Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidOrderStatus {
                required: OrderStatus::Paid,
                ..
            }
        ));
    }

    #[test]
    fn serialization_roundtrip() {
        let order = order();
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
    }
}
