//! Storage error types.

use thiserror::Error;

/// Errors surfaced by the repository traits.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An insert violated a uniqueness constraint.
    ///
    /// For payments this is the expected signal that a concurrent duplicate
    /// request won the race; callers re-query and return the winner.
    #[error("duplicate key violates constraint {constraint}")]
    DuplicateKey { constraint: String },

    /// An update targeted a row that does not exist.
    #[error("{entity} row missing: {id}")]
    RowMissing { entity: &'static str, id: String },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
