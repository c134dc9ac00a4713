//! Inventory record with reservation arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::ProductId;

/// Per-product stock counters.
///
/// `available + reserved` is the total physical stock. The total decreases
/// only through [`confirm`](Self::confirm) (actual consumption) and
/// increases only through [`add_stock`](Self::add_stock). Both counters are
/// unsigned, so they can never go negative.
///
/// A record is mutated only while the caller holds the exclusive per-product
/// row lock; the methods here assume that exclusivity and just perform the
/// arithmetic and its guards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryRecord {
    product_id: ProductId,
    available: u32,
    reserved: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InventoryRecord {
    /// Creates a record with the given initial stock.
    pub fn new(product_id: ProductId, initial_stock: u32, now: DateTime<Utc>) -> Self {
        Self {
            product_id,
            available: initial_stock,
            reserved: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a record from persisted fields.
    pub fn from_parts(
        product_id: ProductId,
        available: u32,
        reserved: u32,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            product_id,
            available,
            reserved,
            created_at,
            updated_at,
        }
    }

    pub fn product_id(&self) -> &ProductId {
        &self.product_id
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Total physical stock, reserved included.
    pub fn total(&self) -> u32 {
        self.available + self.reserved
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves `quantity` from available to reserved.
    ///
    /// The first lock-holder wins; a later contender observes the updated
    /// `available` and fails here with `InsufficientInventory`. That is the
    /// admission-control mechanism, not an error path to retry.
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.available < quantity {
            return Err(DomainError::InsufficientInventory {
                product_id: self.product_id.clone(),
                requested: quantity,
                available: self.available,
            });
        }
        self.available -= quantity;
        self.reserved += quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Returns `quantity` from reserved back to available.
    ///
    /// Used for cancellation, expiration, payment failure and refund
    /// approval.
    pub fn release(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.reserved < quantity {
            return Err(DomainError::InvalidInventoryState {
                product_id: self.product_id.clone(),
                action: "release",
                requested: quantity,
                reserved: self.reserved,
            });
        }
        self.reserved -= quantity;
        self.available += quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Permanently consumes `quantity` of reserved stock.
    ///
    /// Only the reserved counter shrinks; total stock drops by `quantity`,
    /// representing physical fulfillment.
    pub fn confirm(&mut self, quantity: u32, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.reserved < quantity {
            return Err(DomainError::InvalidInventoryState {
                product_id: self.product_id.clone(),
                action: "confirm",
                requested: quantity,
                reserved: self.reserved,
            });
        }
        self.reserved -= quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Adds new stock to the available pool.
    pub fn add_stock(&mut self, quantity: u32, now: DateTime<Utc>) {
        self.available += quantity;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(available: u32) -> InventoryRecord {
        InventoryRecord::new(ProductId::new("SKU-001"), available, Utc::now())
    }

    #[test]
    fn reserve_moves_stock_to_reserved() {
        let mut inv = record(10);
        inv.reserve(6, Utc::now()).unwrap();

        assert_eq!(inv.available(), 4);
        assert_eq!(inv.reserved(), 6);
        assert_eq!(inv.total(), 10);
    }

    #[test]
    fn reserve_beyond_available_fails_and_leaves_state_unchanged() {
        let mut inv = record(10);
        inv.reserve(6, Utc::now()).unwrap();

        let err = inv.reserve(6, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InsufficientInventory {
                requested: 6,
                available: 4,
                ..
            }
        ));
        assert_eq!(inv.available(), 4);
        assert_eq!(inv.reserved(), 6);
    }

    #[test]
    fn release_restores_available() {
        let mut inv = record(10);
        inv.reserve(6, Utc::now()).unwrap();
        inv.release(6, Utc::now()).unwrap();

        assert_eq!(inv.available(), 10);
        assert_eq!(inv.reserved(), 0);
    }

    #[test]
    fn release_more_than_reserved_fails() {
        let mut inv = record(10);
        inv.reserve(2, Utc::now()).unwrap();

        let err = inv.release(3, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInventoryState { .. }));
        assert_eq!(inv.reserved(), 2);
    }

    #[test]
    fn confirm_reduces_total_stock() {
        let mut inv = record(10);
        inv.reserve(4, Utc::now()).unwrap();
        inv.confirm(4, Utc::now()).unwrap();

        assert_eq!(inv.available(), 6);
        assert_eq!(inv.reserved(), 0);
        assert_eq!(inv.total(), 6);
    }

    #[test]
    fn confirm_more_than_reserved_fails() {
        let mut inv = record(10);
        let err = inv.confirm(1, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidInventoryState { .. }));
    }

    #[test]
    fn add_stock_grows_available() {
        let mut inv = record(0);
        inv.add_stock(25, Utc::now());
        assert_eq!(inv.available(), 25);
        assert_eq!(inv.total(), 25);
    }
}
