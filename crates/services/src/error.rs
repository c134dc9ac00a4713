//! Service error types.

use common::{IdempotencyKey, OrderId, OrderLineId, PaymentId, RefundId};
use domain::{DomainError, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors surfaced by the fulfillment services.
///
/// Every variant is a recoverable business error; settlement and sweep
/// failures are handled inside the orchestrator and never reach callers
/// through this type.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Aggregate invariant or state machine guard failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Storage failure not matching a known duplicate-key race.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Bad input from the caller.
    #[error("validation error: {0}")]
    Validation(String),

    /// The catalog has no such product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// No inventory record exists for the product.
    #[error("inventory not found for product {0}")]
    InventoryNotFound(ProductId),

    /// No such order, or it belongs to another user.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// No such payment, or it belongs to another user.
    #[error("payment not found: {0}")]
    PaymentNotFound(PaymentId),

    /// No such refund, or it belongs to another user.
    #[error("refund not found: {0}")]
    RefundNotFound(RefundId),

    /// The idempotency key is already bound to a different order.
    #[error("idempotency key {key} is already used for a different order")]
    DuplicatePayment { key: IdempotencyKey },

    /// The order is not in a refundable status.
    #[error("refund not allowed: {0}")]
    RefundNotAllowed(String),

    /// The request would push a line past its original quantity.
    #[error(
        "refund quantity exceeded for line {order_line_id}: \
         already {already}, requested {requested}, original {original}"
    )]
    RefundQuantityExceeded {
        order_line_id: OrderLineId,
        already: u32,
        requested: u32,
        original: u32,
    },

    /// A referenced order line does not belong to the order.
    #[error("order line not found: {0}")]
    OrderItemNotFound(OrderLineId),

    /// Unexpected storage state, e.g. a row missing right after a
    /// uniqueness violation said it exists.
    #[error("integrity fault: {0}")]
    Integrity(String),
}

/// Convenience alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;
