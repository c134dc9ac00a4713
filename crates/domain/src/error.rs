//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;
use crate::payment::PaymentStatus;
use crate::refund::RefundStatus;
use crate::value_objects::ProductId;

/// Errors raised by aggregate invariants and state machine guards.
///
/// All of these are recoverable business errors; none indicate a broken
/// process. Services wrap them and map them to caller-facing responses.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// Not enough available stock to satisfy a reservation.
    #[error(
        "insufficient inventory for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientInventory {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A release or confirm exceeds the reserved counter.
    #[error(
        "invalid inventory state for product {product_id}: cannot {action} {requested} with {reserved} reserved"
    )]
    InvalidInventoryState {
        product_id: ProductId,
        action: &'static str,
        requested: u32,
        reserved: u32,
    },

    /// The order is not in the status the transition requires.
    #[error("invalid order status: cannot {action} while {current}, requires {required}")]
    InvalidOrderStatus {
        current: OrderStatus,
        required: OrderStatus,
        action: &'static str,
    },

    /// The payment is not in the status the transition requires.
    #[error("invalid payment status: cannot {action} while {current}")]
    InvalidPaymentStatus {
        current: PaymentStatus,
        action: &'static str,
    },

    /// The refund is not in the status the transition requires.
    #[error("invalid refund status: cannot {action} while {current}")]
    InvalidRefundStatus {
        current: RefundStatus,
        action: &'static str,
    },
}
