//! Domain layer for the order fulfillment system.
//!
//! This crate holds the four aggregates and their state machines:
//! - [`InventoryRecord`] with the reserve/release/confirm/add-stock arithmetic
//! - [`Order`] with its immutable line snapshots and status transitions
//! - [`Payment`] with its single-shot terminal transition
//! - [`Refund`] with the admin approval state machine
//!
//! Everything here is pure and synchronous; locking, persistence and
//! collaborator calls live in the `store` and `services` crates.

pub mod error;
pub mod inventory;
pub mod order;
pub mod payment;
pub mod refund;
pub mod value_objects;

pub use error::DomainError;
pub use inventory::InventoryRecord;
pub use order::{Order, OrderLine, OrderStatus};
pub use payment::{Payment, PaymentStatus};
pub use refund::{Refund, RefundLine, RefundStatus};
pub use value_objects::{Money, ProductId};
