//! Persistence layer for the order fulfillment system.
//!
//! Four repository traits — one per logical table — with two backends:
//! [`MemoryStore`] (the reference implementation, `tokio::sync::RwLock`
//! maps) and [`PgStore`] (PostgreSQL via `sqlx`). The one correctness
//! requirement both must honor is the uniqueness of
//! `(user_id, idempotency_key)` on payments: an insert that loses that race
//! fails with [`StoreError::DuplicateKey`] so the caller can re-read the
//! winner.
//!
//! Row-level mutual exclusion for inventory and order mutations is provided
//! by [`KeyedMutex`], which services hold around their read-modify-write
//! cycles.

pub mod error;
pub mod lock;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use lock::KeyedMutex;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{Backend, InventoryStore, OrderStore, PaymentStore, RefundStore};
