//! Order status machine.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// Transitions:
/// ```text
/// Created ──┬──► Paid ──┬──► Completed
///           │           └──► RefundRequested ──► Refunded
///           ├──► Canceled
///           └──► Expired
/// ```
///
/// Completed, Canceled, Expired and Refunded are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order placed, inventory reserved, awaiting payment.
    Created,

    /// Payment settled; awaiting fulfillment.
    Paid,

    /// Fulfilled; reserved stock has been consumed (terminal).
    Completed,

    /// Canceled by the user before payment (terminal).
    Canceled,

    /// Reclaimed by the expiration sweep (terminal).
    Expired,

    /// At least one refund request is open against the payment.
    RefundRequested,

    /// The payment has been fully refunded (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Refunded
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::RefundRequested => "REFUND_REQUESTED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(OrderStatus::Created),
            "PAID" => Ok(OrderStatus::Paid),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "EXPIRED" => Ok(OrderStatus::Expired),
            "REFUND_REQUESTED" => Ok(OrderStatus::RefundRequested),
            "REFUNDED" => Ok(OrderStatus::Refunded),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}
